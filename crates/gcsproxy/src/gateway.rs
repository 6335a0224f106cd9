//! Request dispatch: the gateway core
//!
//! Every request is resolved to a store key, checked against the method
//! toggles and the visibility filter, then handled by method. Failures are
//! funneled once through [`crate::error_pages::dispatch`].

use crate::config::{ConfigError, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::error_pages::{self, ErrorOutcome};
use crate::hide::HideFilter;
use crate::index::resolve_index;
use crate::listing::{build_page, ListingQuery, ListingRenderer};
use crate::resolve::{resolve, ResolvedKey};
use crate::response::{etag, parse_generation, write_object};
use axum::{
    body::Body,
    extract::Request,
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, TryStreamExt};
use gcsproxy_store::{
    ByteRange, GetOptions, ListPage, ListQuery, ObjectAttrs, ObjectStore, PutOptions, StoreError,
    DEFAULT_DELIMITER,
};
use std::sync::Arc;
use tracing::debug;

/// Methods the gateway distinguishes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayMethod {
    Get,
    Put,
    Delete,
    Other,
}

impl From<&Method> for GatewayMethod {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => Self::Get,
            Method::PUT => Self::Put,
            Method::DELETE => Self::Delete,
            _ => Self::Other,
        }
    }
}

/// Result of handing a request to the gateway
#[derive(Debug)]
pub enum Outcome {
    /// The gateway produced the response
    Served(Response),
    /// The request, untouched, for the next handler
    PassThrough(Request),
}

/// Shared, immutable gateway state
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    store: Arc<dyn ObjectStore>,
    hide: Arc<HideFilter>,
    renderer: Option<Arc<ListingRenderer>>,
}

impl Gateway {
    /// Validate `config` and build a ready gateway over `store`
    pub fn new(config: GatewayConfig, store: Arc<dyn ObjectStore>) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let renderer = ListingRenderer::from_config(&config)?.map(Arc::new);
        Ok(Self {
            hide: Arc::new(HideFilter::new(&config.hide)),
            config: Arc::new(config),
            store,
            renderer,
        })
    }

    /// Handle one request
    pub async fn serve(&self, request: Request) -> Outcome {
        let (parts, body) = request.into_parts();
        let method = GatewayMethod::from(&parts.method);
        let resolved = resolve(&self.config.root, &decoded_path(&parts));
        debug!(method = %parts.method, key = %resolved.key, "Dispatching request");

        let (result, body) = match self.admit(method, &resolved) {
            Err(err) => (Err(err), Some(body)),
            Ok(()) => match method {
                GatewayMethod::Get => (self.get(&parts, &resolved).await, Some(body)),
                GatewayMethod::Put => (self.put(&parts, &resolved, body).await, None),
                GatewayMethod::Delete => (self.delete(&resolved).await, Some(body)),
                GatewayMethod::Other => (Err(GatewayError::MethodNotAllowed), Some(body)),
            },
        };

        let err = match result {
            Ok(response) => return Outcome::Served(response),
            Err(err) => err,
        };
        let is_get = method == GatewayMethod::Get;
        match error_pages::dispatch(err, is_get, &self.config, self.store.as_ref()).await {
            ErrorOutcome::Respond(response) => Outcome::Served(response),
            ErrorOutcome::PassThrough => {
                Outcome::PassThrough(Request::from_parts(parts, body.unwrap_or_default()))
            }
        }
    }

    /// Method toggles first, then visibility, so a hidden key cannot turn a
    /// refused method into a 404
    fn admit(&self, method: GatewayMethod, resolved: &ResolvedKey) -> Result<()> {
        match method {
            GatewayMethod::Other => return Err(GatewayError::MethodNotAllowed),
            GatewayMethod::Put if !self.config.enable_put || resolved.is_directory => {
                return Err(GatewayError::MethodNotAllowed)
            }
            GatewayMethod::Delete if !self.config.enable_delete || resolved.is_directory => {
                return Err(GatewayError::MethodNotAllowed)
            }
            _ => {}
        }
        if self.hide.is_hidden(&resolved.key) {
            return Err(GatewayError::NotFound(resolved.key.clone()));
        }
        Ok(())
    }

    async fn get(&self, parts: &Parts, resolved: &ResolvedKey) -> Result<Response> {
        let options = read_conditions(&parts.headers);
        if resolved.is_directory {
            return self.get_directory(parts, resolved, &options).await;
        }
        let reader = self.store.get_object(resolved.store_key(), &options).await?;
        note_if_match(&parts.headers, &reader.attrs);
        Ok(write_object(reader))
    }

    async fn get_directory(
        &self,
        parts: &Parts,
        resolved: &ResolvedKey,
        options: &GetOptions,
    ) -> Result<Response> {
        let index = resolve_index(
            self.store.as_ref(),
            resolved.store_key(),
            &self.config.index_names,
            options,
        )
        .await?;
        if let Some(reader) = index {
            note_if_match(&parts.headers, &reader.attrs);
            return Ok(write_object(reader));
        }
        match &self.renderer {
            Some(renderer) => self.browse(parts, resolved, renderer).await,
            None => Err(GatewayError::Forbidden(format!(
                "cannot view a directory: {}",
                resolved.key
            ))),
        }
    }

    async fn browse(
        &self,
        parts: &Parts,
        resolved: &ResolvedKey,
        renderer: &ListingRenderer,
    ) -> Result<Response> {
        let query = ListingQuery::parse(parts.uri.query());
        let prefix = resolved.store_key().to_string();
        let listing = self
            .store
            .list_objects(&ListQuery {
                prefix: prefix.clone(),
                delimiter: Some(DEFAULT_DELIMITER.to_string()),
                page_token: query.next.clone(),
                max_results: query.max,
            })
            .await?;

        // Directory placeholders and hidden entries never show up in a listing
        let listing = ListPage {
            entries: listing
                .entries
                .into_iter()
                .filter(|entry| {
                    entry.name() != prefix && !self.hide.is_hidden(&format!("/{}", entry.name()))
                })
                .collect(),
            next_page_token: listing.next_page_token,
        };
        let page = build_page(&listing, &query, chrono::Utc::now());

        if wants_json(&parts.headers) {
            let body = serde_json::to_vec(&page)
                .map_err(|e| GatewayError::Internal(format!("encoding listing: {e}")))?;
            return Ok((
                [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
                body,
            )
                .into_response());
        }
        let html = renderer
            .render(&page)
            .map_err(|e| GatewayError::Internal(format!("rendering listing: {e}")))?;
        Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response())
    }

    async fn put(&self, parts: &Parts, resolved: &ResolvedKey, body: Body) -> Result<Response> {
        let headers = &parts.headers;
        let options = PutOptions {
            content_type: header_text(headers, header::CONTENT_TYPE),
            content_encoding: header_text(headers, header::CONTENT_ENCODING),
            content_disposition: header_text(headers, header::CONTENT_DISPOSITION),
            content_language: header_text(headers, header::CONTENT_LANGUAGE),
            cache_control: header_text(headers, header::CACHE_CONTROL),
            ..Default::default()
        };
        let data = body
            .into_data_stream()
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))
            .boxed();

        let attrs = self
            .store
            .put_object(resolved.store_key(), options, data)
            .await?;
        debug!(key = %attrs.key, generation = attrs.generation, size = attrs.size, "Stored object");
        Ok((StatusCode::OK, [(header::ETAG, etag(attrs.generation))]).into_response())
    }

    async fn delete(&self, resolved: &ResolvedKey) -> Result<Response> {
        self.store.delete_object(resolved.store_key()).await?;
        debug!(key = %resolved.key, "Deleted object");
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("browse", &self.renderer.is_some())
            .finish_non_exhaustive()
    }
}

/// Percent-decoded request path; the raw path if it does not decode to UTF-8
fn decoded_path(parts: &Parts) -> String {
    let raw = parts.uri.path();
    urlencoding::decode(raw)
        .map(|path| path.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Store options from `If-None-Match` and `Range`; malformed values are ignored
fn read_conditions(headers: &HeaderMap) -> GetOptions {
    GetOptions {
        generation_match: None,
        generation_not_match: header_text(headers, header::IF_NONE_MATCH)
            .as_deref()
            .and_then(parse_generation),
        range: header_text(headers, header::RANGE)
            .as_deref()
            .and_then(ByteRange::parse),
    }
}

/// `If-Match` never fails a read; a stale or malformed value is only logged
fn note_if_match(headers: &HeaderMap, attrs: &ObjectAttrs) {
    let Some(raw) = header_text(headers, header::IF_MATCH) else {
        return;
    };
    match parse_generation(&raw) {
        Some(generation) if generation == attrs.generation => {}
        Some(generation) => debug!(
            key = %attrs.key,
            requested = generation,
            current = attrs.generation,
            "If-Match does not match current generation, serving current object"
        ),
        None => debug!(key = %attrs.key, value = %raw, "Ignoring malformed If-Match"),
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value: &HeaderValue| value.to_str().ok())
        .any(|value| value.contains("application/json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorPageTarget;
    use crate::testing::FailingStore;
    use gcsproxy_store::MemoryObjectStore;

    fn memory_gateway(config: GatewayConfig) -> (Gateway, MemoryObjectStore) {
        let store = MemoryObjectStore::new();
        let gateway = Gateway::new(config, Arc::new(store.clone())).unwrap();
        (gateway, store)
    }

    fn request(method: Method, uri: &str) -> Request {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn served(outcome: Outcome) -> (StatusCode, HeaderMap, String) {
        let Outcome::Served(response) = outcome else {
            panic!("expected the gateway to respond");
        };
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(GatewayMethod::from(&Method::GET), GatewayMethod::Get);
        assert_eq!(GatewayMethod::from(&Method::PUT), GatewayMethod::Put);
        assert_eq!(GatewayMethod::from(&Method::DELETE), GatewayMethod::Delete);
        assert_eq!(GatewayMethod::from(&Method::HEAD), GatewayMethod::Other);
        assert_eq!(GatewayMethod::from(&Method::POST), GatewayMethod::Other);
    }

    #[tokio::test]
    async fn test_get_object_under_root() {
        let config = GatewayConfig {
            root: "/site".to_string(),
            ..Default::default()
        };
        let (gateway, store) = memory_gateway(config);
        let attrs = store.insert("site/a b.txt", "hello", PutOptions::with_content_type("text/plain"));

        let (status, headers, body) = served(gateway.serve(request(Method::GET, "/a%20b.txt")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hello");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[header::ETAG], format!("\"{}\"", attrs.generation));
    }

    #[tokio::test]
    async fn test_index_order() {
        let (gateway, store) = memory_gateway(GatewayConfig {
            index_names: vec!["index.html".to_string(), "index.txt".to_string()],
            ..Default::default()
        });
        store.insert("docs/index.txt", "text index", PutOptions::default());

        let (status, _, body) = served(gateway.serve(request(Method::GET, "/docs/")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "text index");
    }

    #[tokio::test]
    async fn test_failing_index_falls_back() {
        for (browse, expected) in [(false, StatusCode::FORBIDDEN), (true, StatusCode::OK)] {
            let store = FailingStore::failing(["docs/index.html"]);
            store.inner.insert("docs/index.html", "home", PutOptions::default());
            let gateway = Gateway::new(
                GatewayConfig {
                    enable_browse: browse,
                    ..Default::default()
                },
                Arc::new(store),
            )
            .unwrap();

            let (status, _, body) =
                served(gateway.serve(request(Method::GET, "/docs/")).await).await;
            assert_eq!(status, expected);
            assert_eq!(body.contains("index.html"), browse);
        }
    }

    #[tokio::test]
    async fn test_directory_without_browse_is_forbidden() {
        let (gateway, store) = memory_gateway(GatewayConfig::default());
        store.insert("docs/a.txt", "a", PutOptions::default());
        let (status, _, body) = served(gateway.serve(request(Method::GET, "/docs/")).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_browse_json_filters_hidden_and_placeholders() {
        let (gateway, store) = memory_gateway(GatewayConfig {
            enable_browse: true,
            hide: vec!["_*".to_string()],
            ..Default::default()
        });
        store.insert("docs/", "", PutOptions::default());
        store.insert("docs/a.txt", "a", PutOptions::default());
        store.insert("docs/_draft.txt", "d", PutOptions::default());
        store.insert("docs/sub/b.txt", "b", PutOptions::default());

        let request = Request::builder()
            .uri("/docs/")
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = served(gateway.serve(request).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json; charset=utf-8");

        let page: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(page["count"], 2);
        let names: Vec<&str> = page["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "sub"]);
        assert!(page["more"].is_null());
    }

    #[tokio::test]
    async fn test_browse_html() {
        let (gateway, store) = memory_gateway(GatewayConfig {
            enable_browse: true,
            ..Default::default()
        });
        store.insert("a.txt", "a", PutOptions::default());

        let (status, headers, body) = served(gateway.serve(request(Method::GET, "/")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert!(body.contains("a.txt"));
        assert!(body.contains("number of items: 1"));
    }

    #[tokio::test]
    async fn test_browse_pagination() {
        let (gateway, store) = memory_gateway(GatewayConfig {
            enable_browse: true,
            ..Default::default()
        });
        for i in 0..7 {
            store.insert(format!("files/{i}.txt"), "x", PutOptions::default());
        }

        let json = |uri: &str| {
            Request::builder()
                .uri(uri)
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap()
        };
        let (_, _, body) = served(gateway.serve(json("/files/?max=5")).await).await;
        let page: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(page["count"], 5);
        let more = page["more"].as_str().unwrap().to_string();
        assert!(more.contains("max=5"));

        let (_, _, body) = served(gateway.serve(json(&format!("/files/{more}"))).await).await;
        let page: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(page["count"], 2);
        assert!(page["more"].is_null());
    }

    #[tokio::test]
    async fn test_hidden_key_is_not_found() {
        let (gateway, store) = memory_gateway(GatewayConfig {
            hide: vec!["secret".to_string()],
            ..Default::default()
        });
        store.insert("secret/key.pem", "x", PutOptions::default());
        let (status, _, _) =
            served(gateway.serve(request(Method::GET, "/secret/key.pem")).await).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_disabled_never_touches_store() {
        let (gateway, store) = memory_gateway(GatewayConfig::default());
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/new.txt")
            .body(Body::from("data"))
            .unwrap();
        let (status, _, _) = served(gateway.serve(request).await).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (gateway, store) = memory_gateway(GatewayConfig {
            enable_put: true,
            ..Default::default()
        });
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/notes/today.md")
            .header(header::CONTENT_TYPE, "text/markdown")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from("# today"))
            .unwrap();
        let (status, headers, _) = served(gateway.serve(request).await).await;
        assert_eq!(status, StatusCode::OK);

        let attrs = store.attrs("notes/today.md").unwrap();
        assert_eq!(headers[header::ETAG], format!("\"{}\"", attrs.generation));
        assert_eq!(attrs.content_type.as_deref(), Some("text/markdown"));
        assert_eq!(attrs.cache_control.as_deref(), Some("no-cache"));
        assert_eq!(store.data("notes/today.md").unwrap(), "# today");
    }

    #[tokio::test]
    async fn test_put_directory_not_allowed() {
        let (gateway, store) = memory_gateway(GatewayConfig {
            enable_put: true,
            ..Default::default()
        });
        let (status, _, _) = served(gateway.serve(request(Method::PUT, "/docs/")).await).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (gateway, store) = memory_gateway(GatewayConfig {
            enable_delete: true,
            ..Default::default()
        });
        store.insert("old.txt", "x", PutOptions::default());

        let (status, _, _) = served(gateway.serve(request(Method::DELETE, "/old.txt")).await).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(store.is_empty());

        let (status, _, _) = served(gateway.serve(request(Method::DELETE, "/old.txt")).await).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_directory_always_not_allowed() {
        for enable_delete in [true, false] {
            let (gateway, store) = memory_gateway(GatewayConfig {
                enable_delete,
                ..Default::default()
            });
            store.insert("docs/", "", PutOptions::default());
            let (status, _, _) =
                served(gateway.serve(request(Method::DELETE, "/docs/")).await).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(store.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_other_methods_not_allowed() {
        let (gateway, store) = memory_gateway(GatewayConfig::default());
        store.insert("a.txt", "a", PutOptions::default());
        for method in [Method::HEAD, Method::POST, Method::OPTIONS] {
            let (status, _, _) = served(gateway.serve(request(method, "/a.txt")).await).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        }
    }

    #[tokio::test]
    async fn test_if_none_match_bypasses_error_pages() {
        let mut config = GatewayConfig::default();
        config.default_error_page = Some(ErrorPageTarget::Document("error.html".to_string()));
        let (gateway, store) = memory_gateway(config);
        store.insert("error.html", "oops", PutOptions::default());
        let attrs = store.insert("a.txt", "a", PutOptions::default());

        let request = Request::builder()
            .uri("/a.txt")
            .header(header::IF_NONE_MATCH, format!("\"{}\"", attrs.generation))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = served(gateway.serve(request).await).await;
        assert_eq!(status, StatusCode::NOT_MODIFIED);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_if_match_never_fails() {
        let (gateway, store) = memory_gateway(GatewayConfig::default());
        let attrs = store.insert("a.txt", "current", PutOptions::default());

        for value in [
            format!("\"{}\"", attrs.generation),
            format!("\"{}\"", attrs.generation + 10),
            "not-a-generation".to_string(),
        ] {
            let request = Request::builder()
                .uri("/a.txt")
                .header(header::IF_MATCH, value)
                .body(Body::empty())
                .unwrap();
            let (status, _, body) = served(gateway.serve(request).await).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, "current");
        }
    }

    #[tokio::test]
    async fn test_range_requests() {
        let (gateway, store) = memory_gateway(GatewayConfig::default());
        store.insert("a.txt", "hello world", PutOptions::default());

        let ranged = |range: &str| {
            Request::builder()
                .uri("/a.txt")
                .header(header::RANGE, range)
                .body(Body::empty())
                .unwrap()
        };
        let (status, headers, body) = served(gateway.serve(ranged("bytes=-5")).await).await;
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 6-10/11");
        assert_eq!(body, "world");

        let (status, _, _) = served(gateway.serve(ranged("bytes=50-")).await).await;
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);

        let (status, _, body) = served(gateway.serve(ranged("items=1-2")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hello world");
    }

    #[tokio::test]
    async fn test_pass_through_returns_request() {
        let mut config = GatewayConfig::default();
        config.error_pages.insert(404, ErrorPageTarget::PassThrough);
        let (gateway, _store) = memory_gateway(config);

        match gateway.serve(request(Method::GET, "/missing?x=1")).await {
            Outcome::PassThrough(request) => {
                assert_eq!(request.uri(), "/missing?x=1");
                assert_eq!(request.method(), Method::GET);
            }
            Outcome::Served(response) => panic!("unexpected response {}", response.status()),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GatewayConfig::default();
        config
            .error_pages
            .insert(404, ErrorPageTarget::Document(" ".to_string()));
        let result = Gateway::new(config, Arc::new(MemoryObjectStore::new()));
        assert!(matches!(result, Err(ConfigError::EmptyErrorPage(_))));
    }
}
