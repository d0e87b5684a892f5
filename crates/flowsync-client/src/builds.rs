use std::sync::Arc;

use flowsync_config::ClientConfig;
use flowsync_events::{BuildSnapshot, BuildsResponse};
use tracing::debug;

use crate::error::ClientError;
use crate::http::{check_status, http_client};

/// Snapshot endpoint used when a run ends without streaming its results.
#[derive(Debug, Clone)]
pub struct BuildsApi {
  http: reqwest::Client,
  config: Arc<ClientConfig>,
}

impl BuildsApi {
  pub fn new(config: Arc<ClientConfig>) -> Result<Self, ClientError> {
    let http = http_client(&config)?;
    Ok(Self { http, config })
  }

  pub fn with_http(config: Arc<ClientConfig>, http: reqwest::Client) -> Self {
    Self { http, config }
  }

  /// Latest build record of every vertex of `flow_id`.
  pub async fn fetch(&self, flow_id: &str) -> Result<BuildSnapshot, ClientError> {
    let url = self.config.builds_url();
    debug!(flow_id = %flow_id, url = %url, "fetching vertex builds");

    let response = self
      .http
      .get(&url)
      .query(&[("flow_id", flow_id)])
      .send()
      .await
      .map_err(|e| ClientError::request(&url, e))?;
    let response = check_status(&url, response).await?;

    let body: BuildsResponse = response
      .json()
      .await
      .map_err(|source| ClientError::Decode {
        url: url.clone(),
        source,
      })?;

    Ok(body.vertex_builds)
  }
}
