//! Environment-variable backed configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Variable naming the storage service endpoint.
pub const STORAGE_URL_ENV: &str = "IVCAP_STORAGE_URL";

/// Variable naming the caching proxy endpoint.
pub const CACHE_URL_ENV: &str = "IVCAP_CACHE_URL";

/// Variable carrying the order this worker runs for.
pub const ORDER_ID_ENV: &str = "IVCAP_ORDER_ID";

/// Storage endpoint used when [`STORAGE_URL_ENV`] is unset.
pub const DEFAULT_STORAGE_URL: &str = "http://localhost:8888";

/// Order id reported when [`ORDER_ID_ENV`] is unset.
pub const ORDER_ID_PLACEHOLDER: &str = "???";

/// Resolved configuration for one worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
  /// Bypass the network: publish to the local filesystem, skip readiness.
  #[serde(default)]
  pub local_mode: bool,

  /// Never route external downloads through the cache, even if configured.
  #[serde(default)]
  pub no_caching: bool,

  /// Storage service endpoint, without a trailing slash.
  pub storage_url: String,

  /// Caching proxy endpoint, without a trailing slash.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cache_url: Option<String>,

  /// Order id, if the platform supplied one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub order_id: Option<String>,

  /// Directory local-mode artifacts are written into.
  #[serde(default = "default_local_dir")]
  pub local_dir: PathBuf,
}

impl EnvironmentConfig {
  /// Resolve configuration from the process environment.
  pub fn from_env(local_mode: bool, no_caching: bool) -> Self {
    Self::from_lookup(local_mode, no_caching, |key| std::env::var(key).ok())
  }

  /// Resolve configuration through an arbitrary variable lookup.
  ///
  /// The cache endpoint is not consulted at all when `no_caching` is set.
  pub fn from_lookup<F>(local_mode: bool, no_caching: bool, lookup: F) -> Self
  where
    F: Fn(&str) -> Option<String>,
  {
    let storage_url = lookup(STORAGE_URL_ENV)
      .map(|url| trim_endpoint(&url))
      .unwrap_or_else(|| DEFAULT_STORAGE_URL.to_string());

    let cache_url = if no_caching {
      None
    } else {
      lookup(CACHE_URL_ENV)
        .map(|url| trim_endpoint(&url))
        .filter(|url| !url.is_empty())
    };

    Self {
      local_mode,
      no_caching,
      storage_url,
      cache_url,
      order_id: lookup(ORDER_ID_ENV),
      local_dir: default_local_dir(),
    }
  }

  /// Override the directory local-mode artifacts are written into.
  pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.local_dir = dir.into();
    self
  }

  /// The cache endpoint to route external downloads through, if any.
  pub fn effective_cache_url(&self) -> Option<&str> {
    if self.no_caching {
      return None;
    }
    self.cache_url.as_deref()
  }

  /// `<storage-endpoint>/<path>`.
  pub fn storage_endpoint(&self, path: &str) -> String {
    format!("{}/{}", self.storage_url, path.trim_start_matches('/'))
  }

  /// The order id, or [`ORDER_ID_PLACEHOLDER`] when unset.
  pub fn order_id(&self) -> &str {
    self.order_id.as_deref().unwrap_or(ORDER_ID_PLACEHOLDER)
  }
}

impl Default for EnvironmentConfig {
  fn default() -> Self {
    Self::from_lookup(false, false, |_| None)
  }
}

fn default_local_dir() -> PathBuf {
  PathBuf::from(".")
}

fn trim_endpoint(url: &str) -> String {
  url.trim().trim_end_matches('/').to_string()
}
