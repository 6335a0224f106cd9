//! Object attributes, request options and listing types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::Result;

/// A stream of body chunks, used for both downloads and uploads
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Default content type assigned to objects written without one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Read-only snapshot of an object's attributes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAttrs {
    /// Object key (name) in the bucket
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type
    pub content_type: Option<String>,
    /// Content encoding (e.g. gzip)
    pub content_encoding: Option<String>,
    /// Content disposition
    pub content_disposition: Option<String>,
    /// Content language
    pub content_language: Option<String>,
    /// Cache control directive
    pub cache_control: Option<String>,
    /// Last modification time, if known
    pub updated: Option<DateTime<Utc>>,
    /// Content generation; changes on every write of the key
    pub generation: i64,
    /// Custom metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A byte range as requested by an HTTP `Range` header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-end`, both inclusive
    FromTo(u64, u64),
    /// `bytes=start-`
    From(u64),
    /// `bytes=-len`, the last `len` bytes
    Suffix(u64),
}

impl ByteRange {
    /// Parse a single-range `Range` header value. Multi-range and malformed
    /// values yield `None`.
    pub fn parse(header: &str) -> Option<Self> {
        let spec = header.trim().strip_prefix("bytes=")?;
        if spec.contains(',') {
            return None;
        }
        let (start, end) = spec.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());
        match (start.is_empty(), end.is_empty()) {
            (true, false) => end.parse().ok().map(ByteRange::Suffix),
            (false, true) => start.parse().ok().map(ByteRange::From),
            (false, false) => {
                let start: u64 = start.parse().ok()?;
                let end: u64 = end.parse().ok()?;
                (start <= end).then_some(ByteRange::FromTo(start, end))
            }
            (true, true) => None,
        }
    }

    /// Resolve against an object size. `None` means the range is not satisfiable.
    pub fn resolve(&self, size: u64) -> Option<ContentRange> {
        if size == 0 {
            return None;
        }
        let last = size - 1;
        let (start, end) = match *self {
            ByteRange::FromTo(start, end) => (start, end.min(last)),
            ByteRange::From(start) => (start, last),
            ByteRange::Suffix(0) => return None,
            ByteRange::Suffix(len) => (size.saturating_sub(len), last),
        };
        (start <= last).then_some(ContentRange {
            start,
            end,
            total: size,
        })
    }
}

/// The slice of an object actually returned for a ranged read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte, inclusive
    pub start: u64,
    /// Last byte, inclusive
    pub end: u64,
    /// Full object size
    pub total: u64,
}

// A resolved range always holds at least one byte
#[allow(clippy::len_without_is_empty)]
impl ContentRange {
    /// Number of bytes in the range
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for a `Range` request header
    pub fn request_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Conditions and range applied to a read
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Only succeed if the current generation equals this value
    pub generation_match: Option<i64>,
    /// Fail with not-modified if the current generation equals this value
    pub generation_not_match: Option<i64>,
    /// Return only part of the object
    pub range: Option<ByteRange>,
}

impl GetOptions {
    /// Options without any condition
    pub fn unconditional() -> Self {
        Self::default()
    }
}

/// An open object: its attributes and a body stream
pub struct ObjectReader {
    /// Attributes of the object
    pub attrs: ObjectAttrs,
    /// Set when only part of the object is streamed
    pub range: Option<ContentRange>,
    /// The body
    pub body: ByteStream,
}

impl ObjectReader {
    /// Number of bytes the body will yield
    pub fn content_length(&self) -> u64 {
        self.range.map_or(self.attrs.size, |range| range.len())
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("attrs", &self.attrs)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

/// Attributes set when writing an object
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_disposition: Option<String>,
    pub content_language: Option<String>,
    pub cache_control: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl PutOptions {
    /// Options with only a content type
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            ..Default::default()
        }
    }

    /// True when anything besides content type and encoding is set
    pub fn has_extra_attributes(&self) -> bool {
        self.content_disposition.is_some()
            || self.content_language.is_some()
            || self.cache_control.is_some()
            || !self.metadata.is_empty()
    }
}

/// A prefix listing request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Only keys starting with this prefix
    pub prefix: String,
    /// Group keys sharing a prefix up to this delimiter into one entry
    pub delimiter: Option<String>,
    /// Continuation token from a previous page
    pub page_token: Option<String>,
    /// Page size; the store chooses when unset
    pub max_results: Option<usize>,
}

/// One entry in a prefix listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListEntry {
    /// A common prefix ("sub-directory"), including the trailing delimiter
    Prefix(String),
    /// A leaf object
    Object(ObjectAttrs),
}

impl ListEntry {
    /// The key or prefix this entry stands for
    pub fn name(&self) -> &str {
        match self {
            Self::Prefix(prefix) => prefix,
            Self::Object(attrs) => &attrs.key,
        }
    }
}

/// One page of a prefix listing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Entries in store order
    pub entries: Vec<ListEntry>,
    /// Token for the next page, if any
    pub next_page_token: Option<String>,
}
