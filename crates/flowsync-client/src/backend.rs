//! Starting and cancelling builds.

use std::sync::Arc;

use async_trait::async_trait;
use flowsync_config::ClientConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::http::{check_status, http_client};

/// A request to build a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
  #[serde(skip)]
  pub flow_id: String,
  /// Chat-style inputs, for example `{"input_value": "hi"}`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub inputs: Option<serde_json::Value>,
  #[serde(skip)]
  pub start_component_id: Option<String>,
  #[serde(skip)]
  pub stop_component_id: Option<String>,
}

impl BuildRequest {
  pub fn new(flow_id: impl Into<String>) -> Self {
    Self {
      flow_id: flow_id.into(),
      inputs: None,
      start_component_id: None,
      stop_component_id: None,
    }
  }

  pub fn with_inputs(mut self, inputs: serde_json::Value) -> Self {
    self.inputs = Some(inputs);
    self
  }

  /// Build only from `id` onward.
  pub fn starting_at(mut self, id: impl Into<String>) -> Self {
    self.start_component_id = Some(id.into());
    self
  }

  /// Build only up to `id`.
  pub fn stopping_at(mut self, id: impl Into<String>) -> Self {
    self.stop_component_id = Some(id.into());
    self
  }
}

/// What to build, independent of which flow is open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOptions {
  pub inputs: Option<serde_json::Value>,
  pub start_component_id: Option<String>,
  pub stop_component_id: Option<String>,
}

impl BuildOptions {
  pub fn into_request(self, flow_id: impl Into<String>) -> BuildRequest {
    BuildRequest {
      flow_id: flow_id.into(),
      inputs: self.inputs,
      start_component_id: self.start_component_id,
      stop_component_id: self.stop_component_id,
    }
  }
}

/// The server side of a build.
#[async_trait]
pub trait BuildBackend: Send + Sync {
  async fn start_build(&self, request: &BuildRequest) -> Result<(), ClientError>;

  async fn cancel_build(&self, flow_id: &str) -> Result<(), ClientError>;
}

/// [`BuildBackend`] over the build server's REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpBuildBackend {
  http: reqwest::Client,
  config: Arc<ClientConfig>,
}

impl HttpBuildBackend {
  pub fn new(config: Arc<ClientConfig>) -> Result<Self, ClientError> {
    let http = http_client(&config)?;
    Ok(Self { http, config })
  }

  pub fn with_http(config: Arc<ClientConfig>, http: reqwest::Client) -> Self {
    Self { http, config }
  }
}

#[async_trait]
impl BuildBackend for HttpBuildBackend {
  async fn start_build(&self, request: &BuildRequest) -> Result<(), ClientError> {
    let url = self.config.build_url(&request.flow_id);
    info!(flow_id = %request.flow_id, url = %url, "starting build");

    let mut query = Vec::new();
    if let Some(id) = &request.start_component_id {
      query.push(("start_component_id", id.as_str()));
    }
    if let Some(id) = &request.stop_component_id {
      query.push(("stop_component_id", id.as_str()));
    }

    let response = self
      .http
      .post(&url)
      .query(&query)
      .json(request)
      .send()
      .await
      .map_err(|e| ClientError::request(&url, e))?;
    check_status(&url, response).await?;

    Ok(())
  }

  async fn cancel_build(&self, flow_id: &str) -> Result<(), ClientError> {
    let url = self.config.cancel_url(flow_id);
    info!(flow_id = %flow_id, url = %url, "cancelling build");

    let response = self
      .http
      .post(&url)
      .send()
      .await
      .map_err(|e| ClientError::request(&url, e))?;
    check_status(&url, response).await?;

    Ok(())
  }
}

/// User-facing build actions: start, retry the last request, stop.
#[derive(Clone)]
pub struct BuildControl {
  backend: Arc<dyn BuildBackend>,
  last_request: Arc<Mutex<Option<BuildRequest>>>,
}

impl BuildControl {
  pub fn new(backend: Arc<dyn BuildBackend>) -> Self {
    Self {
      backend,
      last_request: Arc::new(Mutex::new(None)),
    }
  }

  /// Start a build and remember the request for [`BuildControl::retry`].
  pub async fn start(&self, request: BuildRequest) -> Result<(), ClientError> {
    *self.last_request.lock().await = Some(request.clone());
    self.backend.start_build(&request).await
  }

  /// Re-send the last build request. Returns `false` when nothing was built yet.
  pub async fn retry(&self) -> Result<bool, ClientError> {
    let Some(request) = self.last_request.lock().await.clone() else {
      debug!("nothing to retry");
      return Ok(false);
    };

    info!(flow_id = %request.flow_id, "retrying build");
    self.backend.start_build(&request).await?;
    Ok(true)
  }

  /// Request cancellation without waiting for the outcome.
  pub fn stop(&self, flow_id: &str) {
    let backend = self.backend.clone();
    let flow_id = flow_id.to_string();

    tokio::spawn(async move {
      if let Err(e) = backend.cancel_build(&flow_id).await {
        warn!(flow_id = %flow_id, error = %e, "failed to cancel build");
      }
    });
  }

  pub async fn last_request(&self) -> Option<BuildRequest> {
    self.last_request.lock().await.clone()
  }

  /// Forget the last request, e.g. when another flow is opened.
  pub async fn clear(&self) {
    *self.last_request.lock().await = None;
  }
}
