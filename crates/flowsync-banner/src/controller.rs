//! Live banner: ticks, auto-dismiss and the Stop/Retry/Dismiss actions.

use std::time::Duration;

use flowsync_client::{BuildControl, ClientError, SharedFlowState};
use flowsync_config::BannerConfig;
use flowsync_state::FlowState;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::view::{BannerView, render};

/// Tracks when the current run started and when it succeeded.
#[derive(Debug, Default, Clone)]
pub struct BannerClock {
  run_id: Option<String>,
  building: bool,
  started_at: Option<Instant>,
  succeeded_at: Option<Instant>,
}

impl BannerClock {
  pub fn observe(&mut self, state: &FlowState, now: Instant) {
    let run_changed = state.run_id() != self.run_id.as_deref();
    if state.is_building() && (!self.building || run_changed) {
      self.started_at = Some(now);
    }
    self.building = state.is_building();
    self.run_id = state.run_id().map(str::to_string);

    if Self::shows_success(state) {
      self.succeeded_at.get_or_insert(now);
    } else {
      self.succeeded_at = None;
    }
  }

  /// Whether `state` still shows the success this clock last observed.
  pub fn is_same_success(&self, state: &FlowState) -> bool {
    self.succeeded_at.is_some()
      && Self::shows_success(state)
      && state.run_id() == self.run_id.as_deref()
  }

  fn shows_success(state: &FlowState) -> bool {
    !state.is_building()
      && !state.has_node_errors()
      && state.build_info().is_some_and(|info| info.success)
  }

  pub fn started_at(&self) -> Option<Instant> {
    self.started_at
  }

  /// Whether a success has been on screen for at least `after`.
  pub fn dismiss_due(&self, now: Instant, after: Duration) -> bool {
    self
      .succeeded_at
      .is_some_and(|at| now.saturating_duration_since(at) >= after)
  }
}

/// Keeps a [`BannerView`] up to date for the open flow.
pub struct BannerController {
  state: SharedFlowState,
  control: BuildControl,
  config: BannerConfig,
  sender: watch::Sender<BannerView>,
}

impl BannerController {
  pub fn new(state: SharedFlowState, control: BuildControl, config: BannerConfig) -> Self {
    let (sender, _) = watch::channel(BannerView::Hidden);
    Self {
      state,
      control,
      config,
      sender,
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<BannerView> {
    self.sender.subscribe()
  }

  pub fn view(&self) -> BannerView {
    self.sender.borrow().clone()
  }

  /// Re-render on every tick until cancelled.
  pub async fn run(&self, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(self.config.tick());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut clock = BannerClock::default();

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = interval.tick() => {}
      }
      self.tick(&mut clock, Instant::now()).await;
    }

    debug!("banner stopped");
  }

  async fn tick(&self, clock: &mut BannerClock, now: Instant) {
    let mut view = {
      let state = self.state.read().await;
      clock.observe(&state, now);
      render(&state, clock.started_at(), now)
    };

    if clock.dismiss_due(now, self.config.success_dismiss()) {
      let mut state = self.state.write().await;
      if clock.is_same_success(&state) {
        debug!("auto-dismissing success banner");
        state.set_build_info(None);
      }
      clock.observe(&state, now);
      view = render(&state, clock.started_at(), now);
    }

    self.sender.send_if_modified(|current| {
      if *current == view {
        return false;
      }
      *current = view;
      true
    });
  }

  /// Ask the server to cancel the running build. Returns `false` when
  /// nothing is building.
  pub async fn stop(&self) -> bool {
    let flow_id = {
      let state = self.state.read().await;
      if !state.is_building() {
        return false;
      }
      state.flow_id().map(str::to_string)
    };

    match flow_id {
      Some(flow_id) => {
        info!(flow_id = %flow_id, "stop requested");
        self.control.stop(&flow_id);
        true
      }
      None => false,
    }
  }

  /// Re-run the last build request.
  pub async fn retry(&self) -> Result<bool, ClientError> {
    self.control.retry().await
  }

  /// Hide the success or error banner.
  pub async fn dismiss(&self) {
    self.state.write().await.set_build_info(None);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use async_trait::async_trait;
  use flowsync_client::{BuildBackend, BuildRequest};
  use flowsync_config::FlowDef;
  use flowsync_state::{BuildInfo, BuildStatus, RunDescriptor};
  use tokio::sync::{Mutex, RwLock};

  #[derive(Default)]
  struct RecordingBackend {
    started: Mutex<Vec<BuildRequest>>,
    cancelled: Mutex<Vec<String>>,
  }

  #[async_trait]
  impl BuildBackend for RecordingBackend {
    async fn start_build(&self, request: &BuildRequest) -> Result<(), ClientError> {
      self.started.lock().await.push(request.clone());
      Ok(())
    }

    async fn cancel_build(&self, flow_id: &str) -> Result<(), ClientError> {
      self.cancelled.lock().await.push(flow_id.to_string());
      Ok(())
    }
  }

  fn ids(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
  }

  fn setup() -> (Arc<BannerController>, SharedFlowState, Arc<RecordingBackend>) {
    let state = Arc::new(RwLock::new(FlowState::new(&FlowDef::new("flow-1"))));
    let backend = Arc::new(RecordingBackend::default());
    let controller = Arc::new(BannerController::new(
      state.clone(),
      BuildControl::new(backend.clone()),
      BannerConfig::default(),
    ));
    (controller, state, backend)
  }

  async fn start_run(state: &SharedFlowState) {
    let mut state = state.write().await;
    state.update_vertices_build(RunDescriptor::new("r1", ids(&["A"]), ids(&["A"]), vec![]));
    state.update_build_status(&ids(&["A"]), BuildStatus::Building);
    state.set_is_building(true);
  }

  async fn finish_run(state: &SharedFlowState, info: BuildInfo) {
    let mut state = state.write().await;
    state.set_is_building(false);
    state.set_build_info(Some(info));
  }

  fn spawn(controller: &Arc<BannerController>) -> CancellationToken {
    let cancel = CancellationToken::new();
    let controller = controller.clone();
    let token = cancel.clone();
    tokio::spawn(async move { controller.run(token).await });
    cancel
  }

  #[tokio::test(start_paused = true)]
  async fn test_running_view_counts_elapsed_time() {
    let (controller, state, _) = setup();
    start_run(&state).await;
    let cancel = spawn(&controller);

    tokio::time::sleep(Duration::from_millis(1505)).await;

    match controller.view() {
      BannerView::Running { label, elapsed, .. } => {
        assert_eq!(label, "A");
        assert_eq!(elapsed, "1.5s");
      }
      other => panic!("expected running banner, got {:?}", other),
    }
    cancel.cancel();
  }

  #[tokio::test(start_paused = true)]
  async fn test_success_auto_dismisses() {
    let (controller, state, _) = setup();
    start_run(&state).await;
    let cancel = spawn(&controller);
    tokio::time::sleep(Duration::from_millis(50)).await;

    finish_run(&state, BuildInfo::success()).await;
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(matches!(controller.view(), BannerView::Success { .. }));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(controller.view().is_hidden());
    assert!(state.read().await.build_info().is_none());
    cancel.cancel();
  }

  #[tokio::test(start_paused = true)]
  async fn test_error_stays_until_dismissed() {
    let (controller, state, _) = setup();
    start_run(&state).await;
    let cancel = spawn(&controller);
    tokio::time::sleep(Duration::from_millis(50)).await;

    finish_run(&state, BuildInfo::failure(ids(&["boom"]))).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(
      controller.view(),
      BannerView::Error {
        errors: ids(&["boom"])
      }
    );

    controller.dismiss().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(controller.view().is_hidden());
    cancel.cancel();
  }

  #[tokio::test(start_paused = true)]
  async fn test_success_with_failed_nodes_is_not_auto_dismissed() {
    let (controller, state, _) = setup();
    start_run(&state).await;
    let cancel = spawn(&controller);
    tokio::time::sleep(Duration::from_millis(50)).await;

    state.write().await.set_node_errors("A", ids(&["boom"]));
    finish_run(&state, BuildInfo::success()).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(
      controller.view(),
      BannerView::Error {
        errors: ids(&["boom"])
      }
    );
    assert!(state.read().await.build_info().is_some());
    cancel.cancel();
  }

  #[test]
  fn test_clock_rechecks_success_before_dismiss() {
    let mut state = FlowState::new(&FlowDef::new("flow-1"));
    state.update_vertices_build(RunDescriptor::new("r1", ids(&["A"]), ids(&["A"]), vec![]));
    state.set_build_info(Some(BuildInfo::success()));
    let now = Instant::now();
    let mut clock = BannerClock::default();

    clock.observe(&state, now);
    assert!(clock.is_same_success(&state));

    // A newer run finished between the check and the dismissal.
    state.update_vertices_build(RunDescriptor::new("r2", ids(&["A"]), ids(&["A"]), vec![]));
    assert!(!clock.is_same_success(&state));

    state.update_vertices_build(RunDescriptor::new("r1", ids(&["A"]), ids(&["A"]), vec![]));
    state.set_build_info(Some(BuildInfo::failure(ids(&["boom"]))));
    assert!(!clock.is_same_success(&state));

    state.set_build_info(None);
    assert!(!clock.is_same_success(&state));
  }

  #[tokio::test]
  async fn test_stop_only_while_building() {
    let (controller, state, backend) = setup();
    assert!(!controller.stop().await);

    start_run(&state).await;
    assert!(controller.stop().await);

    for _ in 0..100 {
      if !backend.cancelled.lock().await.is_empty() {
        break;
      }
      tokio::task::yield_now().await;
    }
    assert_eq!(*backend.cancelled.lock().await, ids(&["flow-1"]));
  }

  #[tokio::test]
  async fn test_retry_reuses_last_request() {
    let (controller, _, backend) = setup();
    assert!(!controller.retry().await.unwrap());

    controller
      .control
      .start(BuildRequest::new("flow-1"))
      .await
      .unwrap();
    assert!(controller.retry().await.unwrap());

    let started = backend.started.lock().await;
    assert_eq!(started.len(), 2);
    assert_eq!(started[0], started[1]);
  }
}
