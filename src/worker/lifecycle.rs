//! Worker lifecycle states and the transitions between them.

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of one worker version, persisted in the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
  Uninstalled,
  Installing,
  /// Installed and waiting for activation
  Installed,
  Activating,
  /// Intercepting requests from controlled pages
  Active,
  /// Superseded by another version
  Redundant,
}

impl WorkerState {
  /// Check whether `next` is a legal successor of this state.
  pub fn can_transition_to(self, next: WorkerState) -> bool {
    use WorkerState::*;
    matches!(
      (self, next),
      (Uninstalled, Installing)
        | (Installed, Installing)
        | (Redundant, Installing)
        | (Installing, Installed)
        | (Installing, Uninstalled)
        | (Installed, Activating)
        | (Activating, Active)
        | (Installed, Redundant)
        | (Active, Redundant)
    )
  }

  /// Move to `next`, rejecting illegal transitions.
  pub fn transition(self, next: WorkerState) -> Result<WorkerState> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(eyre!("Invalid worker transition: {} -> {}", self, next))
    }
  }

  pub fn can_intercept_fetch(self) -> bool {
    self == WorkerState::Active
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Uninstalled => "uninstalled",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Active => "active",
      Self::Redundant => "redundant",
    }
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for WorkerState {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "uninstalled" => Ok(Self::Uninstalled),
      "installing" => Ok(Self::Installing),
      "installed" => Ok(Self::Installed),
      "activating" => Ok(Self::Activating),
      "active" => Ok(Self::Active),
      "redundant" => Ok(Self::Redundant),
      other => Err(eyre!("Unknown worker state '{}'", other)),
    }
  }
}
