//! Gateway configuration
//!
//! Settings are read from a TOML file and `GCSPROXY_*` environment
//! variables, then validated once into an immutable [`GatewayConfig`] and
//! the [`StoreSettings`] used to build the store client.
//!
//! ```toml
//! bucket = "my-site"
//! root = "/public"
//! index = ["index.html", "index.txt"]
//! hide = ["_*", "/private"]
//! enable_put = false
//! enable_delete = false
//! browse = true
//! default_error_page = "errors/default.html"
//!
//! [error_pages]
//! 404 = "errors/404.html"
//! 403 = "pass_through"
//! ```

use config::{Config, Environment, File, FileFormat};
use gcsproxy_store::{gcs::DEFAULT_ENDPOINT, GcsConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File looked up when no configuration path is given
pub const DEFAULT_CONFIG_FILE: &str = "gcsproxy.toml";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "GCSPROXY";

/// Error-page value that hands the request to the next handler
pub const PASS_THROUGH: &str = "pass_through";

/// Index documents tried when none are configured
pub fn default_index_names() -> Vec<String> {
    vec!["index.html".to_string(), "index.txt".to_string()]
}

/// Errors found while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("bucket must be set and not empty")]
    MissingBucket,

    #[error("'{0}' is not a valid HTTP status code")]
    InvalidStatus(String),

    #[error("status code {0} is outside 100-599")]
    StatusOutOfRange(u16),

    #[error("error page for {0} must not be empty")]
    EmptyErrorPage(String),

    #[error("invalid browse template: {0}")]
    Template(String),
}

/// Where a failed GET is sent
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorPageTarget {
    /// Delegate the whole response to the next handler
    PassThrough,
    /// Stream this store key as the response body
    Document(String),
}

impl ErrorPageTarget {
    /// Parse a configured value; `pass_through` is matched case-insensitively
    pub fn parse(value: &str, context: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::EmptyErrorPage(context.to_string()));
        }
        if value.eq_ignore_ascii_case(PASS_THROUGH) {
            Ok(Self::PassThrough)
        } else {
            Ok(Self::Document(value.to_string()))
        }
    }
}

/// Validated gateway settings, shared read-only by every request
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Key prefix joined in front of every request path
    pub root: String,
    /// Index documents tried, in order, for directory requests
    pub index_names: Vec<String>,
    /// Patterns whose matching keys answer 404
    pub hide: Vec<String>,
    pub enable_put: bool,
    pub enable_delete: bool,
    pub enable_browse: bool,
    /// Custom listing template; the built-in one is used when unset
    pub browse_template: Option<PathBuf>,
    /// Per-status error page overrides
    pub error_pages: BTreeMap<u16, ErrorPageTarget>,
    /// Override used when no per-status entry exists
    pub default_error_page: Option<ErrorPageTarget>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            index_names: default_index_names(),
            hide: Vec::new(),
            enable_put: false,
            enable_delete: false,
            enable_browse: false,
            browse_template: None,
            error_pages: BTreeMap::new(),
            default_error_page: None,
        }
    }
}

impl GatewayConfig {
    /// Check the invariants a hand-built config must hold
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (status, target) in &self.error_pages {
            if !(100..=599).contains(status) {
                return Err(ConfigError::StatusOutOfRange(*status));
            }
            if matches!(target, ErrorPageTarget::Document(key) if key.trim().is_empty()) {
                return Err(ConfigError::EmptyErrorPage(status.to_string()));
            }
        }
        if matches!(&self.default_error_page, Some(ErrorPageTarget::Document(key)) if key.trim().is_empty())
        {
            return Err(ConfigError::EmptyErrorPage("default".to_string()));
        }
        Ok(())
    }

    /// Override for a status: the per-status entry, else the default
    pub fn error_page_for(&self, status: u16) -> Option<&ErrorPageTarget> {
        self.error_pages
            .get(&status)
            .or(self.default_error_page.as_ref())
    }
}

/// Storage backend selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Gcs,
    Memory,
}

/// Settings for the store client
#[derive(Clone, Debug)]
pub struct StoreSettings {
    pub backend: Backend,
    pub bucket: String,
    pub credentials_file: Option<PathBuf>,
    pub project_id: Option<String>,
    pub endpoint: String,
    pub timeout: Duration,
}

impl StoreSettings {
    /// Client configuration for the Cloud Storage backend
    pub fn gcs_config(&self) -> GcsConfig {
        GcsConfig {
            bucket: self.bucket.clone(),
            endpoint: self.endpoint.clone(),
            credentials_file: self.credentials_file.clone(),
            project_id: self.project_id.clone(),
            timeout: self.timeout,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Configuration as written in the file and environment
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub root: String,
    pub bucket: String,
    pub index: Option<Vec<String>>,
    pub hide: Vec<String>,
    pub enable_put: bool,
    pub enable_delete: bool,
    pub browse: bool,
    pub browse_template: Option<PathBuf>,
    /// Keys are status codes, values store keys or `pass_through`
    pub error_pages: BTreeMap<String, String>,
    pub default_error_page: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub project_id: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub backend: Backend,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            bucket: String::new(),
            index: None,
            hide: Vec::new(),
            enable_put: false,
            enable_delete: false,
            browse: false,
            browse_template: None,
            error_pages: BTreeMap::new(),
            default_error_page: None,
            credentials_file: None,
            project_id: None,
            endpoint: None,
            timeout_secs: default_timeout_secs(),
            backend: Backend::Gcs,
        }
    }
}

impl FileConfig {
    /// Load from a file and the process environment.
    ///
    /// An explicit path must exist; without one, [`DEFAULT_CONFIG_FILE`] is
    /// read when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(path, environment())
    }

    /// Parse a TOML document, without consulting the environment
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    fn load_from(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };
        let config = Config::builder().add_source(file).add_source(env).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Validate into the gateway and store settings
    pub fn into_parts(self) -> Result<(GatewayConfig, StoreSettings), ConfigError> {
        let bucket = self.bucket.trim().to_string();
        if bucket.is_empty() && self.backend == Backend::Gcs {
            return Err(ConfigError::MissingBucket);
        }

        let mut error_pages = BTreeMap::new();
        for (status, value) in &self.error_pages {
            let code: u16 = status
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidStatus(status.clone()))?;
            error_pages.insert(code, ErrorPageTarget::parse(value, status)?);
        }

        let default_error_page = self
            .default_error_page
            .as_deref()
            .map(|value| ErrorPageTarget::parse(value, "default"))
            .transpose()?;

        let gateway = GatewayConfig {
            root: self.root,
            index_names: self.index.unwrap_or_else(default_index_names),
            hide: self.hide,
            enable_put: self.enable_put,
            enable_delete: self.enable_delete,
            enable_browse: self.browse || self.browse_template.is_some(),
            browse_template: self.browse_template,
            error_pages,
            default_error_page,
        };
        gateway.validate()?;

        let store = StoreSettings {
            backend: self.backend,
            bucket,
            credentials_file: self.credentials_file,
            project_id: self.project_id,
            endpoint: self
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout: Duration::from_secs(self.timeout_secs),
        };

        Ok((gateway, store))
    }
}

/// `GCSPROXY_BUCKET`, `GCSPROXY_ERROR_PAGES__404`, comma lists for `index` and `hide`
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("index")
        .with_list_parse_key("hide")
        .try_parsing(true)
}
