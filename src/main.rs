use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flowsync_banner::{BannerController, render};
use flowsync_client::{BuildControl, BuildOptions, FlowSession, HttpBuildBackend};
use flowsync_config::{ClientConfig, FlowDef};
use flowsync_events::WireEvent;
use flowsync_orchestrator::{BuildNotice, BuildOrchestrator, ChannelNotifier, Effect};
use flowsync_state::FlowState;

/// Flowsync - follow flow builds from the command line
#[derive(Parser)]
#[command(name = "flowsync")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the client config file (default: ~/.flowsync/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Override the build server base url
  #[arg(long, global = true)]
  base_url: Option<String>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Follow the builds of a flow until interrupted
  Watch {
    #[command(flatten)]
    flow: FlowArgs,
  },

  /// Build a flow and follow it until the run ends
  Run {
    #[command(flatten)]
    flow: FlowArgs,

    /// Build inputs as JSON, e.g. '{"input_value": "hi"}'
    #[arg(long)]
    input: Option<String>,

    /// Build only from this component onward
    #[arg(long)]
    start_component: Option<String>,

    /// Build only up to this component
    #[arg(long)]
    stop_component: Option<String>,
  },

  /// Reconcile a recorded event log offline and print the resulting state
  Replay {
    /// One `{"event": ..., "data": ...}` object per line
    events_file: PathBuf,

    /// Flow id to attribute the events to
    #[arg(long, default_value = "replay")]
    flow_id: String,
  },
}

#[derive(Args)]
struct FlowArgs {
  /// Path to an exported flow (JSON)
  #[arg(long, conflicts_with = "flow_id", required_unless_present = "flow_id")]
  flow: Option<PathBuf>,

  /// Flow id, when no export is at hand
  #[arg(long)]
  flow_id: Option<String>,

  /// Subscribe by endpoint name instead of id
  #[arg(long)]
  endpoint_name: Option<String>,
}

impl FlowArgs {
  fn load(&self) -> Result<FlowDef> {
    let mut flow = match (&self.flow, &self.flow_id) {
      (Some(path), _) => FlowDef::from_file(path)
        .with_context(|| format!("failed to load flow: {}", path.display()))?,
      (None, Some(id)) => FlowDef::new(id.clone()),
      (None, None) => anyhow::bail!("either --flow or --flow-id is required"),
    };

    if let Some(name) = &self.endpoint_name {
      flow = flow.with_endpoint_name(name.clone());
    }
    Ok(flow)
  }
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let config = load_config(cli.config.as_deref(), cli.base_url)?;

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Commands::Watch { flow } => {
      let flow = flow.load()?;
      rt.block_on(async { follow(config, flow, None).await })
    }
    Commands::Run {
      flow,
      input,
      start_component,
      stop_component,
    } => {
      let flow = flow.load()?;
      let inputs: Option<serde_json::Value> = input
        .map(|raw| serde_json::from_str(&raw).context("--input is not valid JSON"))
        .transpose()?;
      let options = BuildOptions {
        inputs,
        start_component_id: start_component,
        stop_component_id: stop_component,
      };
      rt.block_on(async { follow(config, flow, Some(options)).await })
    }
    Commands::Replay {
      events_file,
      flow_id,
    } => replay(&events_file, flow_id),
  }
}

fn load_config(path: Option<&Path>, base_url: Option<String>) -> Result<Arc<ClientConfig>> {
  let default_path = dirs::home_dir().map(|home| home.join(".flowsync").join("config.json"));

  let mut config = match path.map(Path::to_path_buf).or(default_path) {
    Some(path) => ClientConfig::load_or_default(&path)
      .with_context(|| format!("failed to load config: {}", path.display()))?,
    None => ClientConfig::default(),
  };

  if let Some(base_url) = base_url {
    config.base_url = base_url;
  }
  Ok(Arc::new(config))
}

/// Subscribe to `flow` and print the banner as it changes.
///
/// With `build` set, start a build once the stream is connected and return
/// when the run ends.
async fn follow(
  config: Arc<ClientConfig>,
  flow: FlowDef,
  build: Option<BuildOptions>,
) -> Result<ExitCode> {
  let (notifier, mut notices) = ChannelNotifier::channel();
  let backend = HttpBuildBackend::new(config.clone()).context("failed to create http client")?;
  let control = BuildControl::new(Arc::new(backend));
  let mut session = FlowSession::connect(config.clone(), control.clone(), Arc::new(notifier))
    .context("failed to create flow session")?;

  session.open(flow).await;

  let banner = Arc::new(BannerController::new(
    session.state(),
    control,
    config.banner.clone(),
  ));
  let cancel = CancellationToken::new();
  let banner_task = tokio::spawn({
    let banner = banner.clone();
    let cancel = cancel.child_token();
    async move { banner.run(cancel).await }
  });
  let mut views = banner.subscribe();

  let exit_on_end = build.is_some();
  if let Some(options) = build {
    wait_connected(&mut notices).await;
    session
      .start_build(options)
      .await
      .context("failed to start build")?;
  }

  let mut alerted = false;
  let succeeded = loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => {
        info!("interrupted");
        break None;
      }
      changed = views.changed() => {
        if changed.is_err() {
          break None;
        }
        let view = views.borrow_and_update().clone();
        if !view.is_hidden() {
          eprintln!("{}", view);
        }
      }
      notice = notices.recv() => match notice {
        Some(BuildNotice::Alert { message }) => {
          eprintln!("error: {}", message);
          alerted = true;
          // A failed node leaves the run going; a build error ends it.
          if exit_on_end && !session.state().read().await.is_building() {
            break Some(false);
          }
        }
        Some(BuildNotice::Finished { info }) if exit_on_end => break Some(info.success && !alerted),
        Some(_) => {}
        None => break None,
      },
    }
  };

  cancel.cancel();
  if let Err(e) = banner_task.await {
    warn!(error = %e, "banner task failed");
  }

  let state = session.state();
  if exit_on_end {
    let state = state.read().await;
    let view = render(&state, None, tokio::time::Instant::now());
    if !view.is_hidden() {
      eprintln!("{}", view);
    }
    println!("{}", serde_json::to_string_pretty(&outputs(&state))?);
  }
  session.close().await;

  Ok(match succeeded {
    Some(false) => ExitCode::FAILURE,
    _ => ExitCode::SUCCESS,
  })
}

/// Wait briefly for the stream to connect so the run's first events are not missed.
async fn wait_connected(notices: &mut mpsc::UnboundedReceiver<BuildNotice>) {
  let connected = tokio::time::timeout(Duration::from_secs(5), async {
    while let Some(notice) = notices.recv().await {
      if matches!(&notice, BuildNotice::Reconciled { event, .. } if event == "connected") {
        return;
      }
    }
  })
  .await;

  if connected.is_err() {
    warn!("event stream did not confirm the connection, starting the build anyway");
  }
}

fn replay(events_file: &Path, flow_id: String) -> Result<ExitCode> {
  let content = std::fs::read_to_string(events_file)
    .with_context(|| format!("failed to read event log: {}", events_file.display()))?;

  let orchestrator = BuildOrchestrator::new();
  let mut state = FlowState::new(&FlowDef::new(flow_id));

  for (index, line) in content.lines().enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    let wire: WireEvent = serde_json::from_str(line)
      .with_context(|| format!("line {}: not an event record", index + 1))?;

    let event = match wire.parse() {
      Ok(event) => event,
      Err(e) => {
        warn!(line = index + 1, event = %wire.event, error = %e, "skipping event");
        continue;
      }
    };

    for effect in orchestrator.apply(&mut state, event) {
      match effect {
        Effect::Alert { message } => eprintln!("error: {}", message),
        Effect::FetchBuilds { flow_id, run_id } => {
          info!(flow_id = %flow_id, run_id = ?run_id, "results not in log, fetch skipped offline");
        }
      }
    }
  }

  let summary = serde_json::json!({
    "flow_id": state.flow_id(),
    "run_id": state.run_id(),
    "is_building": state.is_building(),
    "registry": state.registry(),
    "pool": state.pool().ids().collect::<Vec<_>>(),
    "build_info": state.build_info(),
    "node_errors": state.node_errors(),
  });
  println!("{}", serde_json::to_string_pretty(&summary)?);

  let failed = state.build_info().is_some_and(|info| !info.success) || state.has_node_errors();
  Ok(if failed {
    ExitCode::FAILURE
  } else {
    ExitCode::SUCCESS
  })
}

/// Vertex outputs keyed by node id.
fn outputs(state: &FlowState) -> serde_json::Map<String, serde_json::Value> {
  state
    .pool()
    .records()
    .iter()
    .map(|(id, record)| (id.clone(), record.data.clone()))
    .collect()
}
