use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Connection settings for the build server.
///
/// Path templates may contain `{flow_id}`, which is substituted when the URL
/// is built. All paths are relative to `base_url` + `api_prefix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
  pub base_url: String,
  pub api_prefix: String,
  /// Server-sent event stream, suffixed with the flow identifier.
  pub events_path: String,
  /// Build snapshot fallback, queried with `?flow_id=`.
  pub builds_path: String,
  pub build_path: String,
  pub cancel_path: String,
  /// Delay before reconnecting a dropped stream, unless the server sends `retry:`.
  pub reconnect_delay_ms: u64,
  /// Drop a stream that delivers no event for this long, heartbeats
  /// included, and reconnect. `0` waits forever.
  pub idle_timeout_ms: u64,
  /// Sent as `x-api-key` on every request when set.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,
  pub banner: BannerConfig,
}

/// Timings for the build banner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerConfig {
  pub tick_ms: u64,
  pub success_dismiss_ms: u64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:7860".to_string(),
      api_prefix: "/api/v1".to_string(),
      events_path: "webhook-events".to_string(),
      builds_path: "monitor/builds".to_string(),
      build_path: "build/{flow_id}/flow".to_string(),
      cancel_path: "build/{flow_id}/cancel".to_string(),
      reconnect_delay_ms: 3000,
      idle_timeout_ms: 90_000,
      api_key: None,
      banner: BannerConfig::default(),
    }
  }
}

impl Default for BannerConfig {
  fn default() -> Self {
    Self {
      tick_ms: 10,
      success_dismiss_ms: 2000,
    }
  }
}

impl ClientConfig {
  /// Load a config file. Missing fields take their defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Like [`ClientConfig::load`], but a file that does not exist yields the defaults.
  pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
    if path.exists() {
      Self::load(path)
    } else {
      Ok(Self::default())
    }
  }

  pub fn events_url(&self, flow_identifier: &str) -> String {
    format!(
      "{}/{}",
      self.join(&self.events_path),
      flow_identifier.trim_start_matches('/')
    )
  }

  pub fn builds_url(&self) -> String {
    self.join(&self.builds_path)
  }

  pub fn build_url(&self, flow_id: &str) -> String {
    self.join(&self.build_path.replace("{flow_id}", flow_id))
  }

  pub fn cancel_url(&self, flow_id: &str) -> String {
    self.join(&self.cancel_path.replace("{flow_id}", flow_id))
  }

  pub fn reconnect_delay(&self) -> Duration {
    Duration::from_millis(self.reconnect_delay_ms)
  }

  pub fn idle_timeout(&self) -> Option<Duration> {
    (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
  }

  fn join(&self, path: &str) -> String {
    let base = self.base_url.trim_end_matches('/');
    let prefix = self.api_prefix.trim_matches('/');
    let path = path.trim_matches('/');

    if prefix.is_empty() {
      format!("{}/{}", base, path)
    } else {
      format!("{}/{}/{}", base, prefix, path)
    }
  }
}

impl BannerConfig {
  pub fn tick(&self) -> Duration {
    Duration::from_millis(self.tick_ms.max(1))
  }

  pub fn success_dismiss(&self) -> Duration {
    Duration::from_millis(self.success_dismiss_ms)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_default_urls() {
    let config = ClientConfig::default();

    assert_eq!(
      config.events_url("my-flow"),
      "http://localhost:7860/api/v1/webhook-events/my-flow"
    );
    assert_eq!(
      config.builds_url(),
      "http://localhost:7860/api/v1/monitor/builds"
    );
    assert_eq!(
      config.build_url("abc"),
      "http://localhost:7860/api/v1/build/abc/flow"
    );
    assert_eq!(
      config.cancel_url("abc"),
      "http://localhost:7860/api/v1/build/abc/cancel"
    );
  }

  #[test]
  fn test_urls_tolerate_slashes() {
    let config = ClientConfig {
      base_url: "http://example.com/".to_string(),
      api_prefix: "api/v2/".to_string(),
      ..Default::default()
    };
    assert_eq!(
      config.events_url("f1"),
      "http://example.com/api/v2/webhook-events/f1"
    );

    let config = ClientConfig {
      api_prefix: String::new(),
      ..config
    };
    assert_eq!(config.builds_url(), "http://example.com/monitor/builds");
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{"base_url": "http://build.internal:9000", "banner": {{"tick_ms": 50}}}}"#
    )
    .unwrap();

    let config = ClientConfig::load(file.path()).unwrap();
    assert_eq!(config.base_url, "http://build.internal:9000");
    assert_eq!(config.reconnect_delay(), Duration::from_millis(3000));
    assert_eq!(config.idle_timeout(), Some(Duration::from_secs(90)));
    assert_eq!(config.banner.tick(), Duration::from_millis(50));
    assert_eq!(config.banner.success_dismiss(), Duration::from_millis(2000));
  }

  #[test]
  fn test_zero_idle_timeout_disables_it() {
    let config = ClientConfig {
      idle_timeout_ms: 0,
      ..Default::default()
    };
    assert_eq!(config.idle_timeout(), None);
  }

  #[test]
  fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::load_or_default(&dir.path().join("nope.json")).unwrap();
    assert_eq!(config, ClientConfig::default());
  }

  #[test]
  fn test_invalid_file_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not json").unwrap();

    let err = ClientConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }
}
