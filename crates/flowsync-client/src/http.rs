use flowsync_config::ClientConfig;
use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::ClientError;

/// Build the shared HTTP client, carrying the api key on every request.
pub fn http_client(config: &ClientConfig) -> Result<reqwest::Client, ClientError> {
  let mut headers = HeaderMap::new();
  if let Some(key) = &config.api_key {
    let value = HeaderValue::from_str(key).map_err(|_| ClientError::InvalidApiKey)?;
    headers.insert("x-api-key", value);
  }

  reqwest::Client::builder()
    .default_headers(headers)
    .build()
    .map_err(ClientError::Client)
}

/// Turn a non-success response into [`ClientError::Status`].
pub(crate) async fn check_status(
  url: &str,
  response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response.text().await.unwrap_or_default();
  Err(ClientError::Status {
    url: url.to_string(),
    status: status.as_u16(),
    body,
  })
}
