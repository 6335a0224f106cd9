//! Access tokens for the storage API

use crate::{Result, StoreError};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Default OAuth2 token endpoint
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Scope requested for storage access
pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account credentials file used for token exchange
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    /// Load a credentials file from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse a credentials document
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// A bearer token and its expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

/// Where bearer tokens for storage requests come from
#[derive(Debug)]
pub enum TokenSource {
    /// No `Authorization` header is sent
    Anonymous,
    /// Tokens obtained with a signed JWT assertion and cached until close to expiry
    ServiceAccount {
        key: ServiceAccountKey,
        cached: RwLock<Option<AccessToken>>,
    },
}

impl TokenSource {
    /// Token source for a service account
    pub fn service_account(key: ServiceAccountKey) -> Self {
        TokenSource::ServiceAccount {
            key,
            cached: RwLock::new(None),
        }
    }

    /// Current bearer token, refreshing it when needed
    pub async fn token(&self, client: &reqwest::Client) -> Result<Option<String>> {
        let (key, cached) = match self {
            TokenSource::Anonymous => return Ok(None),
            TokenSource::ServiceAccount { key, cached } => (key, cached),
        };

        if let Some(token) = cached.read().await.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(Some(token.value.clone()));
            }
        }

        let mut slot = cached.write().await;
        if let Some(token) = slot.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(Some(token.value.clone()));
            }
        }

        let token = exchange(client, key).await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(Some(value))
    }
}

fn signed_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String> {
    let claims = Claims {
        iss: &key.client_email,
        scope: STORAGE_SCOPE,
        aud: &key.token_uri,
        iat: now.timestamp(),
        exp: now.timestamp() + TOKEN_LIFETIME_SECS,
    };
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?)
}

#[instrument(skip(client, key), fields(client_email = %key.client_email))]
async fn exchange(client: &reqwest::Client, key: &ServiceAccountKey) -> Result<AccessToken> {
    let now = Utc::now();
    let assertion = signed_assertion(key, now)?;

    let response = client
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Auth(format!(
            "token endpoint returned {}: {}",
            status.as_u16(),
            body
        )));
    }

    let body: TokenResponse = response.json().await?;
    let lifetime = body.expires_in.unwrap_or(TOKEN_LIFETIME_SECS);
    debug!(expires_in = lifetime, "Obtained storage access token");

    Ok(AccessToken {
        value: body.access_token,
        expires_at: now + Duration::seconds(lifetime),
    })
}
