//! Notices and notifiers for observing reconciliation.
//!
//! Notices are emitted after each event has been applied so that views can
//! re-render, and whenever something must be shown to the user.

use flowsync_state::BuildInfo;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Notices emitted while reconciling a build stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuildNotice {
  /// An event has been applied to the flow state.
  Reconciled {
    event: String,
    run_id: Option<String>,
  },

  /// A message to surface to the user.
  Alert { message: String },

  /// A run finished with the given outcome.
  Finished { info: BuildInfo },
}

/// Trait for receiving build notices.
///
/// Implementations decide what to do with them (render, log, forward, ignore).
pub trait BuildNotifier: Send + Sync {
  fn notify(&self, notice: BuildNotice);
}

/// A no-op notifier that discards all notices.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl BuildNotifier for NoopNotifier {
  fn notify(&self, _notice: BuildNotice) {}
}

/// A notifier that sends notices to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded: notify must never block the stream task.
  sender: mpsc::UnboundedSender<BuildNotice>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<BuildNotice>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with the receiving end.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<BuildNotice>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl BuildNotifier for ChannelNotifier {
  fn notify(&self, notice: BuildNotice) {
    // Receiver may have been dropped
    let _ = self.sender.send(notice);
  }
}
