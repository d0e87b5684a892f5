use thiserror::Error;

/// Errors produced while turning a wire event into a [`crate::BuildEvent`].
#[derive(Debug, Error)]
pub enum EventError {
  /// The event name is not part of the build protocol.
  #[error("unknown event '{0}'")]
  UnknownEvent(String),

  /// The payload did not match the event's schema.
  #[error("malformed '{event}' payload")]
  Malformed {
    event: String,
    #[source]
    source: serde_json::Error,
  },
}
