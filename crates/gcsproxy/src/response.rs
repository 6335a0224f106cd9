//! Object attributes to HTTP response translation

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use gcsproxy_store::{ObjectAttrs, ObjectReader};
use tracing::debug;

/// RFC 7231 IMF-fixdate
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Framing headers custom metadata may not replace
const RESERVED_HEADERS: [HeaderName; 3] = [
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::TRANSFER_ENCODING,
];

/// Quoted decimal generation, e.g. `"1712345678901234"`
pub fn etag(generation: i64) -> HeaderValue {
    // Digits and quotes are always valid header bytes
    HeaderValue::try_from(format!("\"{generation}\"")).unwrap_or(HeaderValue::from_static("\"0\""))
}

/// Generation from a quoted ETag-style header value; weak tags are accepted
pub fn parse_generation(value: &str) -> Option<i64> {
    let value = value.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    value.strip_prefix('"')?.strip_suffix('"')?.parse().ok()
}

pub fn http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

fn insert_text(headers: &mut HeaderMap, name: HeaderName, value: Option<&str>) {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return;
    };
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => debug!(header = %name, "Skipping attribute that is not a valid header value"),
    }
}

/// Headers for a stored object: content attributes, validators and custom metadata
pub fn object_headers(attrs: &ObjectAttrs) -> HeaderMap {
    let mut headers = content_headers(attrs);
    insert_text(&mut headers, header::CACHE_CONTROL, attrs.cache_control.as_deref());
    insert_text(
        &mut headers,
        header::CONTENT_DISPOSITION,
        attrs.content_disposition.as_deref(),
    );
    headers.insert(header::ETAG, etag(attrs.generation));
    if let Some(updated) = attrs.updated {
        insert_text(&mut headers, header::LAST_MODIFIED, Some(&http_date(updated)));
    }

    for (name, value) in &attrs.metadata {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            debug!(metadata = %name, "Skipping metadata key that is not a valid header name");
            continue;
        };
        if RESERVED_HEADERS.contains(&name) {
            continue;
        }
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => debug!(metadata = %name, "Skipping metadata value that is not a valid header value"),
        }
    }
    headers
}

/// The headers describing a body: type, encoding and language
pub fn content_headers(attrs: &ObjectAttrs) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_text(&mut headers, header::CONTENT_TYPE, attrs.content_type.as_deref());
    insert_text(&mut headers, header::CONTENT_ENCODING, attrs.content_encoding.as_deref());
    insert_text(&mut headers, header::CONTENT_LANGUAGE, attrs.content_language.as_deref());
    headers
}

/// Stream an object to the client: 200, or 206 for a ranged read
pub fn write_object(reader: ObjectReader) -> Response {
    let mut headers = object_headers(&reader.attrs);
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(reader.content_length()));

    let status = match reader.range {
        Some(range) => {
            insert_text(&mut headers, header::CONTENT_RANGE, Some(&range.to_string()));
            StatusCode::PARTIAL_CONTENT
        }
        None => StatusCode::OK,
    };

    (status, headers, Body::from_stream(reader.body)).into_response()
}

/// Stream an error document under an already chosen status.
///
/// Only the document's content headers are applied; its validators and
/// cache directives describe the document, not the failed request.
pub fn write_error_document(status: StatusCode, reader: ObjectReader) -> Response {
    let mut headers = content_headers(&reader.attrs);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(reader.content_length()));
    (status, headers, Body::from_stream(reader.body)).into_response()
}
