//! The build reducer.

use std::slice;

use flowsync_events::{BuildEnd, BuildError, BuildEvent, BuildSnapshot, EndVertex, VerticesSorted};
use flowsync_state::{BuildInfo, BuildStatus, FlowState, RunDescriptor};
use tracing::{debug, error, info, warn};

/// Side effects requested by the reducer. The caller carries them out.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
  /// Show a message to the user.
  Alert { message: String },

  /// The run ended without a result snapshot and the pool holds nothing for
  /// it: fetch the results from the snapshot endpoint.
  FetchBuilds {
    flow_id: String,
    run_id: Option<String>,
  },
}

/// Applies build events to a [`FlowState`].
///
/// Every rule is an overwrite keyed by node id, so applying the same event
/// twice leaves the state as applying it once, and a stream replayed after a
/// reconnect cannot corrupt it.
#[derive(Debug, Clone, Default)]
pub struct BuildOrchestrator;

impl BuildOrchestrator {
  pub fn new() -> Self {
    Self
  }

  /// Apply one event and return the effects it requests.
  pub fn apply(&self, state: &mut FlowState, event: BuildEvent) -> Vec<Effect> {
    match event {
      BuildEvent::Connected(payload) => {
        debug!(flow_id = ?state.flow_id(), payload = %payload, "build stream connected");
        Vec::new()
      }
      BuildEvent::VerticesSorted(sorted) => self.on_vertices_sorted(state, sorted),
      BuildEvent::BuildStart(start) => self.on_build_start(state, start.id),
      BuildEvent::EndVertex(end) => self.on_end_vertex(state, end),
      BuildEvent::End(end) => self.on_end(state, end),
      BuildEvent::Error(err) => self.on_error(state, err),
      BuildEvent::Heartbeat => Vec::new(),
      BuildEvent::TransportError { reason } => {
        warn!(flow_id = ?state.flow_id(), reason = %reason, "transport error on build stream");
        Vec::new()
      }
      BuildEvent::Disconnected { reason } => {
        warn!(flow_id = ?state.flow_id(), reason = %reason, "build stream disconnected");
        self.stop_building(state);
        Vec::new()
      }
    }
  }

  /// Apply results fetched for a run that ended without a snapshot.
  ///
  /// Returns false, leaving the state alone, when the flow or the run has
  /// changed since the fetch was requested.
  pub fn apply_fetched_builds(
    &self,
    state: &mut FlowState,
    flow_id: &str,
    run_id: Option<&str>,
    snapshot: BuildSnapshot,
  ) -> bool {
    if state.flow_id() != Some(flow_id) || state.run_id() != run_id {
      debug!(
        flow_id = %flow_id,
        run_id = ?run_id,
        current_run_id = ?state.run_id(),
        "discarding fetched builds for a superseded run"
      );
      return false;
    }

    debug!(flow_id = %flow_id, run_id = ?run_id, vertices = snapshot.len(), "applying fetched builds");
    state.replace_flow_pool(snapshot);
    true
  }

  fn on_vertices_sorted(&self, state: &mut FlowState, sorted: VerticesSorted) -> Vec<Effect> {
    let run = RunDescriptor::from_sorted(&sorted, uuid::Uuid::new_v4().to_string());

    info!(
      flow_id = ?state.flow_id(),
      run_id = %run.run_id(),
      vertices = run.vertices_ids().len(),
      to_run = run.vertices_to_run().len(),
      "run started"
    );

    let unknown: Vec<&String> = run
      .vertices_ids()
      .iter()
      .filter(|id| !state.is_known_node(id))
      .collect();
    if !unknown.is_empty() {
      debug!(run_id = %run.run_id(), unknown = ?unknown, "run names vertices missing from the flow");
    }

    state.update_build_status(run.vertices_ids(), BuildStatus::ToBuild);
    state.clear_edges_running_by_nodes();
    state.clear_node_errors();
    state.set_current_building_node_id(Vec::new());
    state.set_build_info(None);
    state.set_is_building(true);
    state.update_vertices_build(run);

    Vec::new()
  }

  fn on_build_start(&self, state: &mut FlowState, id: String) -> Vec<Effect> {
    if state.has_finished_in_run(&id) {
      warn!(
        run_id = ?state.run_id(),
        node_id = %id,
        status = ?state.status(&id),
        "ignoring build_start for a node that already finished in this run"
      );
      return Vec::new();
    }

    debug!(run_id = ?state.run_id(), node_id = %id, "vertex building");

    let ids = slice::from_ref(&id);
    state.update_build_status(ids, BuildStatus::Building);
    state.update_edges_running_by_nodes(ids, true);

    let mut current = state.current_building_node_ids().to_vec();
    if !current.contains(&id) {
      current.push(id);
    }
    state.set_current_building_node_id(current);

    Vec::new()
  }

  fn on_end_vertex(&self, state: &mut FlowState, end: EndVertex) -> Vec<Effect> {
    let EndVertex {
      build_data: mut record,
      run_id,
    } = end;
    let id = record.id.clone();

    if id.is_empty() {
      warn!(run_id = ?state.run_id(), "end_vertex without a vertex id");
      return Vec::new();
    }

    let inactivated = record.inactivated_vertices.clone();
    if !inactivated.is_empty() {
      debug!(node_id = %id, inactivated = ?inactivated, "inactivating downstream vertices");
      state.remove_from_flow_pool(&inactivated);
      state.update_build_status(&inactivated, BuildStatus::Inactive);
      state.remove_from_vertices_build(&inactivated);
      for node in &inactivated {
        state.set_node_errors(node, Vec::new());
      }
    }

    let own_run_id = record.run_id.take();
    record.run_id = run_id
      .or(own_run_id)
      .or_else(|| state.run_id().map(str::to_string));
    let valid = record.valid;
    let next = record.next_vertices_ids.clone();
    let errors = if valid {
      Vec::new()
    } else {
      let mut errors = record.error_messages();
      if errors.is_empty() {
        errors.push(format!("{} failed to build", id));
      }
      errors
    };
    state.add_data_to_flow_pool(record, &id);

    let mut effects = Vec::new();
    let status = if valid {
      debug!(run_id = ?state.run_id(), node_id = %id, "vertex built");
      BuildStatus::Built
    } else {
      warn!(run_id = ?state.run_id(), node_id = %id, errors = ?errors, "vertex failed");
      // A replayed failure is already on screen.
      if state.node_errors().get(&id) != Some(&errors) {
        effects.push(Effect::Alert {
          message: format!("{}: {}", id, errors.join("; ")),
        });
      }
      BuildStatus::Error
    };
    state.set_node_errors(&id, errors);

    let ids = slice::from_ref(&id);
    state.update_build_status(ids, status);
    state.update_edges_running_by_nodes(ids, false);
    state.remove_from_vertices_build(ids);

    let current: Vec<String> = state
      .current_building_node_ids()
      .iter()
      .filter(|n| **n != id)
      .cloned()
      .collect();
    state.set_current_building_node_id(current);

    // Arm the next layer, but never move a node backward within the run.
    let next: Vec<String> = next
      .into_iter()
      .filter(|n| !state.has_finished_in_run(n) && state.status(n) != Some(BuildStatus::Building))
      .collect();
    if !next.is_empty() {
      state.update_build_status(&next, BuildStatus::ToBuild);
      state.update_edges_running_by_nodes(&next, true);
    }

    effects
  }

  fn on_end(&self, state: &mut FlowState, end: BuildEnd) -> Vec<Effect> {
    let BuildEnd {
      success,
      error: messages,
      vertex_builds,
    } = end;

    if !success {
      let in_flight: Vec<String> = state
        .run()
        .map(|run| {
          run
            .vertices_ids()
            .iter()
            .filter(|id| state.status(id) == Some(BuildStatus::Building))
            .cloned()
            .collect()
        })
        .unwrap_or_default();
      state.update_build_status(&in_flight, BuildStatus::Error);
    }

    self.stop_building(state);

    let info = if success {
      if state.has_node_errors() {
        warn!(
          flow_id = ?state.flow_id(),
          run_id = ?state.run_id(),
          failed = ?state.node_errors().keys().collect::<Vec<_>>(),
          "run succeeded with failed vertices"
        );
      } else {
        info!(flow_id = ?state.flow_id(), run_id = ?state.run_id(), "run succeeded");
      }
      BuildInfo::success()
    } else {
      error!(flow_id = ?state.flow_id(), run_id = ?state.run_id(), errors = ?messages, "run failed");
      BuildInfo::failure(messages)
    };
    state.set_build_info(Some(info));

    match vertex_builds {
      Some(snapshot) => {
        state.replace_flow_pool(snapshot);
        Vec::new()
      }
      None => {
        let missing = match state.run_id() {
          Some(run_id) => !state.pool().has_run(run_id),
          None => state.pool().is_empty(),
        };

        match state.flow_id() {
          Some(flow_id) if missing => vec![Effect::FetchBuilds {
            flow_id: flow_id.to_string(),
            run_id: state.run_id().map(str::to_string),
          }],
          _ => Vec::new(),
        }
      }
    }
  }

  fn on_error(&self, state: &mut FlowState, err: BuildError) -> Vec<Effect> {
    error!(flow_id = ?state.flow_id(), run_id = ?state.run_id(), message = %err.message, "build error");
    self.stop_building(state);

    vec![Effect::Alert {
      message: err.message,
    }]
  }

  fn stop_building(&self, state: &mut FlowState) {
    state.set_is_building(false);
    state.clear_edges_running_by_nodes();
    state.set_current_building_node_id(Vec::new());
  }
}
