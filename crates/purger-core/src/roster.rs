//! The shared candidate roster.
//!
//! Design:
//! - One map, keyed by member id, is the source of truth for live decisions.
//! - One exclusive lock guards it. Every read-then-write (reconciliation
//!   swap, claim, confirm) holds the guard for its whole critical section.
//! - Reconciliation replaces the whole map; it never upserts single keys.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info};

use crate::domain::{ActionCandidate, ErrorKind, MemberId};
use crate::ports::{PersistedState, RegistryProvider};

pub type CandidateMap = HashMap<MemberId, ActionCandidate>;

/// Cloneable handle to the guarded map. Clones share the same map.
#[derive(Clone, Default)]
pub struct Roster {
    inner: Arc<Mutex<CandidateMap>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, CandidateMap> {
        self.inner.lock().await
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn get(&self, id: MemberId) -> Option<ActionCandidate> {
        self.inner.lock().await.get(&id).cloned()
    }

    /// Copy of the whole roster in its durable shape.
    pub async fn persisted(&self, saved_at: DateTime<Utc>) -> PersistedState {
        let map = self.inner.lock().await;
        persisted_from(&map, saved_at)
    }

    /// Replace the roster with previously persisted state.
    ///
    /// The live registration check is not persisted; unregistered-only
    /// candidates are rebound to `registry` here. Entries without a reason
    /// are dropped. Returns the number of candidates restored.
    pub async fn restore(
        &self,
        state: PersistedState,
        registry: Option<&Arc<dyn RegistryProvider>>,
    ) -> usize {
        let mut restored = CandidateMap::with_capacity(state.candidates.len());
        for mut candidate in state.candidates {
            if candidate.reason.is_empty() {
                error!(
                    member = %candidate.name,
                    id = %candidate.id,
                    kind = ?ErrorKind::InvariantViolation,
                    "persisted candidate has no reason; dropping"
                );
                continue;
            }
            if candidate.unregistered_only
                && let Some(registry) = registry
            {
                candidate.bind_registration(Arc::clone(registry));
            }
            restored.insert(candidate.id, candidate);
        }

        let count = restored.len();
        *self.inner.lock().await = restored;
        info!(candidates = count, saved_at = %state.saved_at, "restored roster from state store");
        count
    }
}

pub(crate) fn persisted_from(map: &CandidateMap, saved_at: DateTime<Utc>) -> PersistedState {
    let mut candidates: Vec<ActionCandidate> = map.values().cloned().collect();
    candidates.sort_by_key(|candidate| candidate.id);
    PersistedState::new(saved_at, candidates)
}
