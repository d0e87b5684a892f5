use std::fmt;

use flowsync_state::FlowState;
use serde::Serialize;
use tokio::time::Instant;

pub const RUNNING_LABEL: &str = "Running";
pub const SUCCESS_MESSAGE: &str = "Flow built successfully";
pub const FAILURE_MESSAGE: &str = "Flow build failed";

/// What the banner shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BannerView {
  Hidden,
  Running {
    /// The node being built, or [`RUNNING_LABEL`].
    label: String,
    /// Seconds since the run started, one decimal.
    elapsed: String,
    finished: usize,
    total: usize,
  },
  Success {
    message: String,
  },
  Error {
    errors: Vec<String>,
  },
}

impl BannerView {
  pub fn can_stop(&self) -> bool {
    matches!(self, BannerView::Running { .. })
  }

  pub fn can_retry(&self) -> bool {
    matches!(self, BannerView::Error { .. })
  }

  pub fn can_dismiss(&self) -> bool {
    matches!(self, BannerView::Success { .. } | BannerView::Error { .. })
  }

  pub fn is_hidden(&self) -> bool {
    matches!(self, BannerView::Hidden)
  }
}

impl fmt::Display for BannerView {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BannerView::Hidden => Ok(()),
      BannerView::Running {
        label,
        elapsed,
        finished,
        total,
      } => write!(f, "building {} [{}/{}] {}", label, finished, total, elapsed),
      BannerView::Success { message } => write!(f, "{}", message),
      BannerView::Error { errors } => {
        write!(f, "{}", FAILURE_MESSAGE)?;
        if !errors.is_empty() {
          write!(f, ": {}", errors.join("; "))?;
        }
        Ok(())
      }
    }
  }
}

/// Derive the banner from the flow state.
///
/// `started_at` is when the current run was first seen building.
pub fn render(state: &FlowState, started_at: Option<Instant>, now: Instant) -> BannerView {
  if state.is_building() {
    let label = state
      .first_building_node()
      .or_else(|| state.current_building_node_ids().first().map(String::as_str))
      .unwrap_or(RUNNING_LABEL)
      .to_string();
    let elapsed = started_at
      .map(|started| now.saturating_duration_since(started))
      .unwrap_or_default();
    let (finished, total) = state.progress();

    return BannerView::Running {
      label,
      elapsed: format!("{:.1}s", elapsed.as_secs_f64()),
      finished,
      total,
    };
  }

  match state.build_info() {
    None => BannerView::Hidden,
    Some(info) if info.success && !state.has_node_errors() => BannerView::Success {
      message: SUCCESS_MESSAGE.to_string(),
    },
    Some(info) => {
      let mut errors = info.error.clone();
      for message in state.node_error_messages() {
        if !errors.contains(&message) {
          errors.push(message);
        }
      }
      BannerView::Error { errors }
    }
  }
}
