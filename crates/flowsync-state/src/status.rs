use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle stage of one node within a build run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
  ToBuild,
  Building,
  Built,
  Error,
  Inactive,
}

impl BuildStatus {
  /// Whether the node is done for the current run.
  pub fn is_finished(self) -> bool {
    matches!(
      self,
      BuildStatus::Built | BuildStatus::Error | BuildStatus::Inactive
    )
  }
}

impl fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      BuildStatus::ToBuild => "TO_BUILD",
      BuildStatus::Building => "BUILDING",
      BuildStatus::Built => "BUILT",
      BuildStatus::Error => "ERROR",
      BuildStatus::Inactive => "INACTIVE",
    };
    f.write_str(s)
  }
}
