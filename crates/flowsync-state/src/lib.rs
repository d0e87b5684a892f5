//! Flow build state.
//!
//! Everything the editor shows about a running build lives in a [`FlowState`]
//! owned by the currently open flow:
//!
//! ```text
//! FlowState
//! ├── BuildStatusRegistry   node id -> BuildStatus (badges)
//! ├── FlowExecutionPool     node id -> last VertexBuildRecord (inspection)
//! ├── FlowEdges             edge animation
//! ├── RunDescriptor         the current run's plan (immutable per run)
//! ├── pending / current     progress of the current run
//! ├── node errors           node id -> failure messages of the current run
//! ├── is_building
//! └── BuildInfo             aggregate outcome of the last run
//! ```
//!
//! The store exposes a mutation API only; the reconciliation rules that drive
//! it live in `flowsync-orchestrator`.

mod edges;
mod pool;
mod registry;
mod run;
mod status;
mod store;

pub use edges::{EdgeState, FlowEdges};
pub use pool::FlowExecutionPool;
pub use registry::BuildStatusRegistry;
pub use run::{BuildInfo, RunDescriptor};
pub use status::BuildStatus;
pub use store::FlowState;
