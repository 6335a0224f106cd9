//! Google Cloud Storage JSON API client

use crate::auth::{ServiceAccountKey, TokenSource};
use crate::{
    ByteStream, GetOptions, ListEntry, ListPage, ListQuery, ObjectAttrs, ObjectReader,
    ObjectStore, PutOptions, Result, StoreError, DEFAULT_CONTENT_TYPE,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Public endpoint of the storage JSON API
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Header naming the project billed for requests
const USER_PROJECT_HEADER: &str = "x-goog-user-project";

/// Configuration for a Cloud Storage bucket
#[derive(Clone, Debug)]
pub struct GcsConfig {
    /// Bucket name
    pub bucket: String,
    /// API base URL (e.g. an emulator at "http://localhost:4443")
    pub endpoint: String,
    /// Service-account credentials; anonymous access when unset
    pub credentials_file: Option<PathBuf>,
    /// Project billed for requests
    pub project_id: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials_file: None,
            project_id: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl GcsConfig {
    /// Create with a bucket name and defaults for everything else
    pub fn with_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }
}

/// Object store backed by a Cloud Storage bucket
#[derive(Clone)]
pub struct GcsObjectStore {
    client: Client,
    config: GcsConfig,
    tokens: Arc<TokenSource>,
}

impl GcsObjectStore {
    /// Create a client. Credentials are read here; tokens are fetched lazily.
    pub fn new(config: GcsConfig) -> Result<Self> {
        if config.bucket.trim().is_empty() {
            return Err(StoreError::Configuration("bucket name is empty".to_string()));
        }

        let tokens = match &config.credentials_file {
            Some(path) => TokenSource::service_account(ServiceAccountKey::from_file(path)?),
            None => TokenSource::Anonymous,
        };
        Self::with_token_source(config, tokens)
    }

    /// Create a client with an explicit token source
    pub fn with_token_source(config: GcsConfig, tokens: TokenSource) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            config,
            tokens: Arc::new(tokens),
        })
    }

    /// The bucket this client talks to
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    fn objects_url(&self) -> String {
        format!(
            "{}/storage/v1/b/{}/o",
            self.endpoint(),
            urlencoding::encode(&self.config.bucket)
        )
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.objects_url(), urlencoding::encode(key))
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint(),
            urlencoding::encode(&self.config.bucket)
        )
    }

    /// Start a request carrying the bearer token and billing project
    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let mut builder = self.client.request(method, url);
        if let Some(token) = self.tokens.token(&self.client).await? {
            builder = builder.bearer_auth(token);
        }
        if let Some(project) = &self.config.project_id {
            builder = builder.header(USER_PROJECT_HEADER, project);
        }
        Ok(builder)
    }

    async fn fetch_attrs(&self, key: &str, options: &GetOptions) -> Result<ObjectAttrs> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(generation) = options.generation_match {
            params.push(("ifGenerationMatch", generation.to_string()));
        }
        if let Some(generation) = options.generation_not_match {
            params.push(("ifGenerationNotMatch", generation.to_string()));
        }

        let response = self
            .request(Method::GET, &self.object_url(key))
            .await?
            .query(&params)
            .send()
            .await?;
        let resource: ObjectResource = check_status(response, key).await?.json().await?;
        resource.try_into()
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    #[instrument(skip(self, options), fields(bucket = %self.config.bucket))]
    async fn get_object(&self, key: &str, options: &GetOptions) -> Result<ObjectReader> {
        let attrs = self.fetch_attrs(key, options).await?;

        let range = match options.range {
            Some(requested) => Some(
                requested
                    .resolve(attrs.size)
                    .ok_or_else(|| StoreError::RangeNotSatisfiable(key.to_string()))?,
            ),
            None => None,
        };

        // Pin the generation so the body matches the attributes just read.
        let mut builder = self
            .request(Method::GET, &self.object_url(key))
            .await?
            .query(&[("alt", "media".to_string()), ("generation", attrs.generation.to_string())])
            // Without it, gzip objects are decompressed in transit and ranges
            // are ignored, so the body would no longer match size and encoding.
            .header(header::ACCEPT_ENCODING, "gzip");
        if let Some(range) = range {
            builder = builder.header(header::RANGE, range.request_header());
        }
        let response = check_status(builder.send().await?, key).await?;

        let body = response.bytes_stream().map_err(StoreError::from).boxed();
        Ok(ObjectReader { attrs, range, body })
    }

    #[instrument(skip(self, options, body), fields(bucket = %self.config.bucket))]
    async fn put_object(
        &self,
        key: &str,
        options: PutOptions,
        body: ByteStream,
    ) -> Result<ObjectAttrs> {
        let mut params = vec![("uploadType", "media"), ("name", key)];
        if let Some(encoding) = options.content_encoding.as_deref() {
            params.push(("contentEncoding", encoding));
        }
        let content_type = options
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let response = self
            .request(Method::POST, &self.upload_url())
            .await?
            .query(&params)
            .header(header::CONTENT_TYPE, content_type)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await?;
        let resource: ObjectResource = check_status(response, key).await?.json().await?;
        let attrs: ObjectAttrs = resource.try_into()?;

        if !options.has_extra_attributes() {
            return Ok(attrs);
        }

        // Media uploads only carry type and encoding; the rest is patched on,
        // guarded so a concurrent write is never modified.
        let patch = MetadataPatch {
            cache_control: options.cache_control,
            content_disposition: options.content_disposition,
            content_language: options.content_language,
            metadata: (!options.metadata.is_empty()).then_some(options.metadata),
        };
        let response = self
            .request(Method::PATCH, &self.object_url(key))
            .await?
            .query(&[("ifGenerationMatch", attrs.generation.to_string())])
            .json(&patch)
            .send()
            .await?;
        let resource: ObjectResource = check_status(response, key).await?.json().await?;
        resource.try_into()
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn delete_object(&self, key: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &self.object_url(key))
            .await?
            .send()
            .await?;
        check_status(response, key).await?;
        Ok(())
    }

    #[instrument(skip(self, query), fields(bucket = %self.config.bucket, prefix = %query.prefix))]
    async fn list_objects(&self, query: &ListQuery) -> Result<ListPage> {
        let mut params: Vec<(&str, String)> = vec![("prefix", query.prefix.clone())];
        if let Some(delimiter) = &query.delimiter {
            params.push(("delimiter", delimiter.clone()));
        }
        if let Some(token) = &query.page_token {
            params.push(("pageToken", token.clone()));
        }
        if let Some(max) = query.max_results {
            params.push(("maxResults", max.to_string()));
        }

        let response = self
            .request(Method::GET, &self.objects_url())
            .await?
            .query(&params)
            .send()
            .await?;
        let listing: ListResponse = check_status(response, &query.prefix).await?.json().await?;
        debug!(
            objects = listing.items.len(),
            prefixes = listing.prefixes.len(),
            "Listed objects"
        );

        let mut entries = listing
            .items
            .into_iter()
            .map(|item| item.try_into().map(ListEntry::Object))
            .collect::<Result<Vec<_>>>()?;
        entries.extend(listing.prefixes.into_iter().map(ListEntry::Prefix));
        entries.sort_by(|a, b| a.name().cmp(b.name()));

        Ok(ListPage {
            entries,
            next_page_token: listing.next_page_token,
        })
    }
}

/// Turn a non-success status into the matching store error
async fn check_status(response: Response, key: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let err = match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(key.to_string()),
        StatusCode::PRECONDITION_FAILED => StoreError::PreconditionFailed(key.to_string()),
        StatusCode::NOT_MODIFIED => StoreError::NotModified(key.to_string()),
        StatusCode::RANGE_NOT_SATISFIABLE => StoreError::RangeNotSatisfiable(key.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::PermissionDenied(response.text().await.unwrap_or_default())
        }
        _ => StoreError::Api {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        },
    };
    Err(err)
}

/// Object resource as returned by the JSON API. Numbers arrive as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    #[serde(default)]
    size: Option<String>,
    content_type: Option<String>,
    content_encoding: Option<String>,
    content_disposition: Option<String>,
    content_language: Option<String>,
    cache_control: Option<String>,
    updated: Option<DateTime<Utc>>,
    #[serde(default)]
    generation: Option<String>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, String>>,
}

fn parse_number<T: std::str::FromStr>(field: &str, value: Option<String>) -> Result<T>
where
    T: Default,
{
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| StoreError::Deserialization(format!("invalid {field}: {raw}"))),
        None => Ok(T::default()),
    }
}

impl TryFrom<ObjectResource> for ObjectAttrs {
    type Error = StoreError;

    fn try_from(resource: ObjectResource) -> Result<Self> {
        Ok(ObjectAttrs {
            size: parse_number("size", resource.size)?,
            generation: parse_number("generation", resource.generation)?,
            key: resource.name,
            content_type: resource.content_type,
            content_encoding: resource.content_encoding,
            content_disposition: resource.content_disposition,
            content_language: resource.content_language,
            cache_control: resource.cache_control,
            updated: resource.updated,
            metadata: resource.metadata.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(default)]
    prefixes: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<BTreeMap<String, String>>,
}
