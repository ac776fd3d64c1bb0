use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Last known state of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Unknown,
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
            MonitorStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which targets a forced check covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "scope", content = "id")]
pub enum ForceScope {
    All,
    Target(Uuid),
}

impl ForceScope {
    pub fn covers(&self, target_id: Uuid) -> bool {
        match self {
            ForceScope::All => true,
            ForceScope::Target(id) => *id == target_id,
        }
    }
}

/// How a dispatched probe ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum Settlement {
    /// Outcome folded into the day bucket and the target snapshot
    Recorded { target_id: Uuid, is_up: bool },
    /// Target was removed while the probe ran; the outcome was dropped
    TargetGone { target_id: Uuid, is_up: bool },
    /// The stored URL could not be resolved; nothing was probed
    Unresolvable { target_id: Uuid },
    /// The outcome could not be written
    StorageFailed { target_id: Uuid, is_up: bool },
}

impl Settlement {
    pub fn target_id(&self) -> Uuid {
        match *self {
            Settlement::Recorded { target_id, .. }
            | Settlement::TargetGone { target_id, .. }
            | Settlement::Unresolvable { target_id }
            | Settlement::StorageFailed { target_id, .. } => target_id,
        }
    }

    /// Probe outcome, if a probe actually ran
    pub fn is_up(&self) -> Option<bool> {
        match *self {
            Settlement::Recorded { is_up, .. }
            | Settlement::TargetGone { is_up, .. }
            | Settlement::StorageFailed { is_up, .. } => Some(is_up),
            Settlement::Unresolvable { .. } => None,
        }
    }
}
