use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read '{path}'")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse '{path}'")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}
