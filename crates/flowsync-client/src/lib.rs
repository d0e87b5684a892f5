//! Network side of flowsync.
//!
//! - [`EventStreamClient`] subscribes to a flow's build event stream and
//!   hands parsed events to an [`EventSink`].
//! - [`FlowSession`] owns the open flow's [`SharedFlowState`] and reconciles
//!   every event into it through the build orchestrator.
//! - [`BuildsApi`] fetches result snapshots for runs that ended without them.
//! - [`BuildControl`] starts, retries and stops builds over a [`BuildBackend`].

mod backend;
mod builds;
mod error;
mod http;
mod session;
mod stream;

pub use backend::{BuildBackend, BuildControl, BuildOptions, BuildRequest, HttpBuildBackend};
pub use builds::BuildsApi;
pub use error::ClientError;
pub use http::http_client;
pub use session::{FlowSession, SharedFlowState};
pub use stream::{EventSink, EventStreamClient, Subscription};
