//! Build stream events.
//!
//! The build server reports the progress of a flow build as a stream of named
//! server-sent events, each carrying a JSON payload. This crate turns a
//! `(name, data)` pair into a [`BuildEvent`], a tagged union that the
//! orchestrator can match on exhaustively without knowing anything about the
//! transport.
//!
//! # Wire events
//!
//! ```text
//! connected        informational
//! vertices_sorted  { ids, to_run, run_id }
//! build_start      { id }
//! end_vertex       { build_data: { id, valid, data, next_vertices_ids?, inactivated_vertices? }, run_id? }
//! end              { success, error?, vertex_builds? }
//! error            { message }          (anything else on this channel is a transport error)
//! heartbeat        -
//! ```

mod error;
mod event;
mod parse;
mod record;

pub use error::EventError;
pub use event::{BuildEnd, BuildError, BuildEvent, BuildStart, EndVertex, VerticesSorted};
pub use parse::{WireEvent, classify_error, parse_event};
pub use record::{BuildSnapshot, BuildsResponse, VertexBuildRecord};
