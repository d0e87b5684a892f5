use thiserror::Error;

/// Errors talking to the build server.
#[derive(Debug, Error)]
pub enum ClientError {
  /// The request could not be sent or the response could not be read.
  #[error("request to {url} failed")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// The server answered with a non-success status.
  #[error("{url} returned {status}: {body}")]
  Status {
    url: String,
    status: u16,
    body: String,
  },

  /// The response body did not match the expected shape.
  #[error("unexpected response from {url}")]
  Decode {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// The event stream broke while reading.
  #[error("event stream from {url} broke: {message}")]
  Stream { url: String, message: String },

  #[error("invalid api key header value")]
  InvalidApiKey,

  #[error("failed to build http client")]
  Client(#[source] reqwest::Error),
}

impl ClientError {
  pub(crate) fn request(url: &str, source: reqwest::Error) -> Self {
    Self::Request {
      url: url.to_string(),
      source,
    }
  }
}
