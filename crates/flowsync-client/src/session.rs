//! The flow session: one open flow, its state and its subscription.

use std::sync::Arc;

use async_trait::async_trait;
use flowsync_config::{ClientConfig, FlowDef};
use flowsync_events::BuildEvent;
use flowsync_orchestrator::{BuildNotice, BuildNotifier, BuildOrchestrator, Effect};
use flowsync_state::FlowState;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backend::{BuildControl, BuildOptions};
use crate::builds::BuildsApi;
use crate::error::ClientError;
use crate::stream::{EventSink, EventStreamClient, Subscription};

/// Shared handle to the open flow's state. The reconciler is the only writer.
pub type SharedFlowState = Arc<RwLock<FlowState>>;

/// Owns the state of the open flow and keeps it in sync with the build stream.
///
/// Opening another flow closes the previous subscription before the state is
/// reset, so no event of the old flow can land in the new one.
pub struct FlowSession {
  client: EventStreamClient,
  builds: BuildsApi,
  control: BuildControl,
  notifier: Arc<dyn BuildNotifier>,
  state: SharedFlowState,
  flow: Option<FlowDef>,
  subscription: Option<Subscription>,
}

impl FlowSession {
  pub fn new(
    client: EventStreamClient,
    builds: BuildsApi,
    control: BuildControl,
    notifier: Arc<dyn BuildNotifier>,
  ) -> Self {
    Self {
      client,
      builds,
      control,
      notifier,
      state: Arc::new(RwLock::new(FlowState::default())),
      flow: None,
      subscription: None,
    }
  }

  /// A session talking to the server described by `config`.
  pub fn connect(
    config: Arc<ClientConfig>,
    control: BuildControl,
    notifier: Arc<dyn BuildNotifier>,
  ) -> Result<Self, ClientError> {
    let http = crate::http::http_client(&config)?;
    Ok(Self::new(
      EventStreamClient::with_http(config.clone(), http.clone()),
      BuildsApi::with_http(config, http),
      control,
      notifier,
    ))
  }

  pub fn state(&self) -> SharedFlowState {
    self.state.clone()
  }

  pub fn control(&self) -> BuildControl {
    self.control.clone()
  }

  pub fn flow(&self) -> Option<&FlowDef> {
    self.flow.as_ref()
  }

  pub fn subscription(&self) -> Option<&Subscription> {
    self.subscription.as_ref()
  }

  /// Switch to `flow`: close the old subscription, reset state, subscribe.
  pub async fn open(&mut self, flow: FlowDef) {
    if let Some(previous) = self.subscription.take() {
      previous.close().await;
    }
    if self.flow.as_ref().is_some_and(|open| open.id != flow.id) {
      self.control.clear().await;
    }

    info!(flow_id = %flow.id, flow = %flow.flow_identifier(), "opening flow");
    self.state.write().await.reset(&flow);

    let reconciler = Arc::new(Reconciler {
      state: self.state.clone(),
      orchestrator: BuildOrchestrator::new(),
      notifier: self.notifier.clone(),
      builds: self.builds.clone(),
    });
    self.subscription = Some(self.client.subscribe(&flow, reconciler));
    self.flow = Some(flow);
  }

  /// Build the open flow and remember the request for retry.
  pub async fn start_build(&self, options: BuildOptions) -> Result<bool, ClientError> {
    let Some(flow) = &self.flow else {
      warn!("no flow is open");
      return Ok(false);
    };

    self.control.start(options.into_request(flow.id.clone())).await?;
    Ok(true)
  }

  pub async fn close(&mut self) {
    if let Some(subscription) = self.subscription.take() {
      subscription.close().await;
    }
  }
}

/// Applies stream events to the shared state and carries out their effects.
struct Reconciler {
  state: SharedFlowState,
  orchestrator: BuildOrchestrator,
  notifier: Arc<dyn BuildNotifier>,
  builds: BuildsApi,
}

impl Reconciler {
  fn perform(&self, effect: Effect) {
    match effect {
      Effect::Alert { message } => self.notifier.notify(BuildNotice::Alert { message }),
      Effect::FetchBuilds { flow_id, run_id } => self.fetch_builds(flow_id, run_id),
    }
  }

  /// Fetch results in the background; the stream keeps flowing meanwhile.
  fn fetch_builds(&self, flow_id: String, run_id: Option<String>) {
    let state = self.state.clone();
    let orchestrator = self.orchestrator.clone();
    let notifier = self.notifier.clone();
    let builds = self.builds.clone();

    tokio::spawn(async move {
      let snapshot = match builds.fetch(&flow_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
          warn!(flow_id = %flow_id, run_id = ?run_id, error = %e, "failed to fetch vertex builds");
          return;
        }
      };

      let applied = {
        let mut state = state.write().await;
        orchestrator.apply_fetched_builds(&mut state, &flow_id, run_id.as_deref(), snapshot)
      };
      if applied {
        notifier.notify(BuildNotice::Reconciled {
          event: "vertex_builds".to_string(),
          run_id,
        });
      }
    });
  }
}

#[async_trait]
impl EventSink for Reconciler {
  async fn handle(&self, event: BuildEvent) {
    let name = event.name();
    let ends_run = matches!(event, BuildEvent::End(_));
    debug!(event = %name, "reconciling build event");

    let (effects, run_id, finished) = {
      let mut state = self.state.write().await;
      let effects = self.orchestrator.apply(&mut state, event);
      let finished = if ends_run {
        state.build_info().cloned()
      } else {
        None
      };
      (effects, state.run_id().map(str::to_string), finished)
    };

    for effect in effects {
      self.perform(effect);
    }

    self.notifier.notify(BuildNotice::Reconciled {
      event: name.to_string(),
      run_id,
    });
    if let Some(info) = finished {
      self.notifier.notify(BuildNotice::Finished { info });
    }
  }
}
