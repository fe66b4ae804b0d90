//! Finite State Machine for the deployment lifecycle

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// FSM settings
#[derive(Debug, Clone)]
pub struct FsmSettings {
    /// Compare-and-set attempts before a contended transition gives up
    pub cas_retry_limit: u32,
}

impl Default for FsmSettings {
    fn default() -> Self {
        Self { cas_retry_limit: 8 }
    }
}

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    /// Known but not yet queued
    Pending,

    /// Build job requested
    Queued,

    /// Build worker reported it started
    InProgress,

    /// Artifacts uploaded, servable
    Completed,

    /// Dispatch failed, build failed or cancelled
    Failed,
}

impl DeploymentStatus {
    /// Terminal states are permanent
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Completed | DeploymentStatus::Failed)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Pending | DeploymentStatus::Queued | DeploymentStatus::InProgress
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "PENDING",
            DeploymentStatus::Queued => "QUEUED",
            DeploymentStatus::InProgress => "IN_PROGRESS",
            DeploymentStatus::Completed => "COMPLETED",
            DeploymentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DeploymentStatus::Pending),
            "QUEUED" => Ok(DeploymentStatus::Queued),
            "IN_PROGRESS" => Ok(DeploymentStatus::InProgress),
            "COMPLETED" => Ok(DeploymentStatus::Completed),
            "FAILED" => Ok(DeploymentStatus::Failed),
            _ => Err(format!("Invalid deployment status: {}", s)),
        }
    }
}

/// Deployment event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentEvent {
    /// A status derived from a log line or a dispatch failure
    Signal(DeploymentStatus),

    /// User cancellation
    Cancel,
}

/// Result of feeding an event to the FSM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status changed (or was rewritten) to `to`
    Applied {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    /// The deployment is terminal; nothing changes
    Ignored { current: DeploymentStatus },
}

impl Transition {
    pub fn target(&self) -> Option<DeploymentStatus> {
        match self {
            Transition::Applied { to, .. } => Some(*to),
            Transition::Ignored { .. } => None,
        }
    }
}

/// Deployment FSM
///
/// Non-terminal states may move to any state; terminal states accept nothing.
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
}

impl DeploymentFsm {
    /// Create an FSM positioned at a stored status
    pub fn new(state: DeploymentStatus) -> Self {
        Self { state }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<Transition, String> {
        let from = self.state;

        let to = match (from, event) {
            (current, _) if current.is_terminal() && event != DeploymentEvent::Cancel => {
                return Ok(Transition::Ignored { current });
            }

            (current, DeploymentEvent::Cancel) => {
                if !current.is_cancellable() {
                    return Err(format!("Cannot cancel a deployment in state {}", current));
                }
                DeploymentStatus::Failed
            }

            (_, DeploymentEvent::Signal(target)) => target,
        };

        self.state = to;
        Ok(Transition::Applied { from, to })
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new(DeploymentStatus::Pending)
    }
}
