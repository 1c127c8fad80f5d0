//! Configuration for the worker, its HTTP client, the proxy and storage paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::validate_cache_name;
use crate::error::{Error, Result};
use crate::request::{Request, parse_url};

/// Default name of the cache the worker populates.
pub const DEFAULT_CACHE_NAME: &str = "mkr1010-cache";

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "PRECACHE_CONFIG";

/// Configuration for the install-and-serve worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name of the cache opened on install and matched on fetch.
    pub cache_name: String,
    /// Base URL relative asset paths are resolved against.
    pub origin: String,
    /// Ordered asset paths to pre-cache on install.
    pub precache: Vec<String>,
    /// Maximum number of assets fetched at once during install.
    pub concurrent_fetches: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            origin: "http://127.0.0.1:8000/".to_string(),
            precache: vec!["index.html".to_string(), "manifest.json".to_string()],
            concurrent_fetches: 4,
        }
    }
}

impl WorkerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache name.
    #[must_use]
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Sets the origin URL.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Replaces the pre-cache list.
    #[must_use]
    pub fn with_precache<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the install fetch concurrency.
    #[must_use]
    pub const fn with_concurrent_fetches(mut self, concurrent: usize) -> Self {
        self.concurrent_fetches = concurrent;
        self
    }

    /// Parses the origin URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the origin is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url> {
        parse_url(&self.origin)
    }

    /// Resolves a path (or absolute URL) against the origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the origin or the joined URL is invalid.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin_url()?
            .join(path)
            .map_err(|source| Error::InvalidUrl {
                url: path.to_string(),
                source,
            })
    }

    /// Builds the `GET` requests for the pre-cache list, in list order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] for an unresolvable entry and
    /// [`Error::DuplicateAsset`] if two entries resolve to the same request.
    pub fn precache_requests(&self) -> Result<Vec<Request>> {
        let mut requests: Vec<Request> = Vec::with_capacity(self.precache.len());
        for path in &self.precache {
            let request = Request::get(self.resolve(path)?);
            if requests.iter().any(|r| r.key() == request.key()) {
                return Err(Error::DuplicateAsset(request.url.to_string()));
            }
            requests.push(request);
        }
        Ok(requests)
    }

    /// Checks the origin and cache name.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        validate_cache_name(&self.cache_name)?;
        self.origin_url()?;
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("precache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Proxy server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Returns `host:port`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory holding one sub-directory per named cache.
    pub cache_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            cache_dir: data_dir.join("precache").join("caches"),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Worker configuration.
    pub worker: WorkerConfig,
    /// HTTP client configuration.
    pub http: HttpConfig,
    /// Proxy server configuration.
    pub server: ServerConfig,
    /// Path configuration.
    pub paths: PathConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location.
    ///
    /// Uses `PRECACHE_CONFIG` when set, falling back to
    /// `$XDG_CONFIG_HOME/precache/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("precache")
            .join("config.toml")
    }

    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or the worker settings
    /// do not validate.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.worker.validate()?;
        Ok(config)
    }

    /// Loads a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Loads a config file, writing a default template first if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be written or the file cannot
    /// be parsed.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    /// Saves the config atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file cannot
    /// be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let body = toml::to_string_pretty(self)?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, format!("{TEMPLATE_HEADER}{body}"))?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

const TEMPLATE_HEADER: &str = "\
# precache configuration
#
# [worker].precache lists the assets stored on install, resolved against
# [worker].origin. Add any other essential assets there.

";
