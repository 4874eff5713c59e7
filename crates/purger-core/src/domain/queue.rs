//! The two remediation queues.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::ActionCandidate;

/// Remediation queue an operator works from.
///
/// Remediation is two-step:
/// - Strip: remove elevated access from a candidate that still holds it.
/// - Boot: remove membership once no elevated access is left.
///
/// A candidate moves from Strip to Boot on its own once a snapshot no longer
/// reports privileges, after sitting out the stasis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionQueue {
    Strip,
    Boot,
}

impl ActionQueue {
    pub const ALL: [ActionQueue; 2] = [ActionQueue::Strip, ActionQueue::Boot];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionQueue::Strip => "strip",
            ActionQueue::Boot => "boot",
        }
    }

    /// Does this queue accept the candidate, ignoring any lease on it?
    ///
    /// Lease and live registration checks are layered on top by the claim
    /// manager.
    pub fn admits(self, candidate: &ActionCandidate, now: DateTime<Utc>, stasis: Duration) -> bool {
        if candidate.in_stasis(now, stasis) {
            return false;
        }
        match self {
            ActionQueue::Strip => candidate.has_privileges,
            ActionQueue::Boot => !candidate.has_privileges && !candidate.purged,
        }
    }
}

impl fmt::Display for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action queue '{0}' (expected 'strip' or 'boot')")]
pub struct UnknownQueue(pub String);

impl FromStr for ActionQueue {
    type Err = UnknownQueue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strip" => Ok(ActionQueue::Strip),
            "boot" => Ok(ActionQueue::Boot),
            other => Err(UnknownQueue(other.to_string())),
        }
    }
}
