//! Lease tokens handed to the operator-facing layer.

use serde::{Deserialize, Serialize};

use super::ids::MemberId;
use super::queue::ActionQueue;

/// An operator's working set on one queue.
///
/// Opaque to the caller; it is kept in session or request state and handed
/// back on confirmation. The session layer stores strings, hence
/// [`LeaseToken::encode`] / [`LeaseToken::decode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseToken {
    pub queue: ActionQueue,
    pub members: Vec<MemberId>,
}

impl LeaseToken {
    pub fn new(queue: ActionQueue, members: Vec<MemberId>) -> Self {
        Self { queue, members }
    }

    pub fn empty(queue: ActionQueue) -> Self {
        Self::new(queue, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Comma-separated member ids.
    pub fn encode(&self) -> String {
        self.members
            .iter()
            .map(MemberId::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Inverse of [`LeaseToken::encode`]. Fragments that are not ids are
    /// skipped, so a damaged session value degrades to a smaller lease.
    pub fn decode(queue: ActionQueue, encoded: &str) -> Self {
        let members = encoded
            .split(',')
            .filter_map(|part| part.parse::<MemberId>().ok())
            .collect();
        Self::new(queue, members)
    }
}
