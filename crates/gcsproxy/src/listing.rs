//! Directory listings: page building and rendering

use crate::config::{ConfigError, GatewayConfig};
use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use gcsproxy_store::{ListEntry, ListPage, MAX_LIST_RESULTS};
use minijinja::Environment;
use serde::Serialize;
use std::path::Path;

/// Name under which the listing template is registered; the `.html`
/// suffix turns on HTML auto-escaping.
const TEMPLATE_NAME: &str = "listing.html";

/// Built-in listing page
pub const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Index</title>
</head>
<body>
<ul>
{%- for item in items %}
<li>
{%- if item.is_dir %}
<a href="{{ item.url }}">{{ item.name }}</a>
{%- else %}
<a href="{{ item.url }}">{{ item.name }}</a> Size: {{ item.size }} Last Modified: {{ item.last_modified }}
{%- endif %}
</li>
{%- endfor %}
</ul>
<p>number of items: {{ count }}</p>
{%- if more %}
<a href="{{ more }}">more...</a>
{%- endif %}
</body>
</html>
"#;

/// One entry of a listing page
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Item {
    pub name: String,
    pub is_dir: bool,
    /// Full store key (or prefix, for directories)
    pub key: String,
    /// Link relative to the listed directory
    pub url: String,
    pub size: String,
    pub last_modified: String,
}

/// A rendered-ready listing page
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PageResult {
    pub count: usize,
    pub items: Vec<Item>,
    /// Query string fetching the next page, if any
    pub more: Option<String>,
}

/// Pagination parameters of a directory GET
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingQuery {
    /// Continuation token from a previous page's "more" link
    pub next: Option<String>,
    /// Page size, between 1 and 1000
    pub max: Option<usize>,
}

impl ListingQuery {
    /// Read `next` and `max` from a raw query string. An invalid `max` is ignored.
    pub fn parse(query: Option<&str>) -> Self {
        let mut parsed = Self::default();
        let Some(query) = query else {
            return parsed;
        };
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match name.as_ref() {
                "next" if !value.is_empty() => parsed.next = Some(value.into_owned()),
                "max" => {
                    parsed.max = value
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .filter(|max| (1..=MAX_LIST_RESULTS).contains(max));
                }
                _ => {}
            }
        }
        parsed
    }
}

/// Last path segment of a key or prefix, ignoring trailing slashes
fn base_name(name: &str) -> &str {
    let trimmed = name.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Bytes in decimal units, e.g. `512 B`, `1.5 MB`
pub fn human_size(bytes: u64) -> String {
    ByteSize(bytes).to_string_as(false)
}

/// Relative time such as `3 minutes ago` or `2 days from now`
pub fn human_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;
    const WEEK: i64 = 7 * DAY;
    const MONTH: i64 = 30 * DAY;
    const YEAR: i64 = 365 * DAY;

    let delta = now.signed_duration_since(then).num_seconds();
    let (secs, direction) = if delta < 0 {
        (-delta, "from now")
    } else {
        (delta, "ago")
    };

    let (amount, unit) = match secs {
        0 => return "now".to_string(),
        s if s < MINUTE => (s, "second"),
        s if s < HOUR => (s / MINUTE, "minute"),
        s if s < DAY => (s / HOUR, "hour"),
        s if s < WEEK => (s / DAY, "day"),
        s if s < MONTH => (s / WEEK, "week"),
        s if s < YEAR => (s / MONTH, "month"),
        s => (s / YEAR, "year"),
    };
    let plural = if amount == 1 { "" } else { "s" };
    format!("{amount} {unit}{plural} {direction}")
}

/// Turn one store listing page into a [`PageResult`], keeping store order
pub fn build_page(listing: &ListPage, query: &ListingQuery, now: DateTime<Utc>) -> PageResult {
    let items: Vec<Item> = listing
        .entries
        .iter()
        .map(|entry| match entry {
            ListEntry::Prefix(prefix) => {
                let name = base_name(prefix);
                Item {
                    name: name.to_string(),
                    is_dir: true,
                    key: prefix.clone(),
                    url: format!("./{}/", urlencoding::encode(name)),
                    size: String::new(),
                    last_modified: String::new(),
                }
            }
            ListEntry::Object(attrs) => {
                let name = base_name(&attrs.key);
                Item {
                    name: name.to_string(),
                    is_dir: false,
                    key: attrs.key.clone(),
                    url: format!("./{}", urlencoding::encode(name)),
                    size: human_size(attrs.size),
                    last_modified: attrs
                        .updated
                        .map(|updated| human_age(updated, now))
                        .unwrap_or_default(),
                }
            }
        })
        .collect();

    let more = listing.next_page_token.as_deref().map(|token| {
        let mut link = url::form_urlencoded::Serializer::new(String::new());
        link.append_pair("next", token);
        if let Some(max) = query.max {
            link.append_pair("max", &max.to_string());
        }
        format!("?{}", link.finish())
    });

    PageResult {
        count: items.len(),
        items,
        more,
    }
}

/// Renders listing pages to HTML
pub struct ListingRenderer {
    env: Environment<'static>,
}

impl ListingRenderer {
    /// Renderer using [`DEFAULT_TEMPLATE`]
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_source(DEFAULT_TEMPLATE.to_string())
    }

    /// Renderer using a template file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Template(format!("{}: {}", path.display(), e)))?;
        Self::from_source(source)
    }

    /// Renderer for a template given as text
    pub fn from_source(source: String) -> Result<Self, ConfigError> {
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, source)
            .map_err(|e| ConfigError::Template(e.to_string()))?;
        Ok(Self { env })
    }

    /// The renderer a config asks for; `None` when browsing is off
    pub fn from_config(config: &GatewayConfig) -> Result<Option<Self>, ConfigError> {
        if !config.enable_browse {
            return Ok(None);
        }
        let renderer = match &config.browse_template {
            Some(path) => Self::from_file(path)?,
            None => Self::builtin()?,
        };
        Ok(Some(renderer))
    }

    pub fn render(&self, page: &PageResult) -> Result<String, minijinja::Error> {
        self.env.get_template(TEMPLATE_NAME)?.render(page)
    }
}

impl std::fmt::Debug for ListingRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingRenderer").finish_non_exhaustive()
    }
}
