//! Build orchestration for flowsync.
//!
//! The [`BuildOrchestrator`] is a pure reducer: it takes a [`BuildEvent`] and
//! a [`FlowState`], applies the reconciliation rules, and returns the
//! [`Effect`]s the caller has to carry out. It never touches the network, so
//! the rules can be exercised without a stream.
//!
//! ```text
//! BuildEvent ──▶ BuildOrchestrator::apply(&mut FlowState) ──▶ Vec<Effect>
//!                                                                 │
//!                     Alert ──▶ BuildNotifier                     │
//!                     FetchBuilds ──▶ snapshot endpoint ◀─────────┘
//! ```
//!
//! [`BuildEvent`]: flowsync_events::BuildEvent
//! [`FlowState`]: flowsync_state::FlowState

mod notifier;
mod orchestrator;

pub use notifier::{BuildNotice, BuildNotifier, ChannelNotifier, NoopNotifier};
pub use orchestrator::{BuildOrchestrator, Effect};
