//! Persister - fire-and-forget persistence after roster changes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::StoreError;
use crate::ports::{PersistedState, StateStore};
use crate::roster::{Roster, persisted_from};

/// Writes roster copies to the state store off the critical path.
///
/// Failures are logged and otherwise ignored: the in-memory roster stays
/// authoritative and the next trigger writes the whole state again.
///
/// Every copy gets a sequence number when it is handed over. Callers take
/// the copy and trigger while holding the roster lock, so sequence order is
/// roster order. Writes are serialized and a copy older than the last one
/// written is discarded.
#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn StateStore>,
    issued: Arc<AtomicU64>,
    written: Arc<Mutex<u64>>,
}

impl Persister {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            issued: Arc::new(AtomicU64::new(0)),
            written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Spawn a background write. The handle is only useful to tests.
    pub fn trigger(&self, state: PersistedState) -> JoinHandle<()> {
        let seq = self.next_seq();
        let persister = self.clone();
        tokio::spawn(async move {
            let candidates = state.candidates.len();
            match persister.write(seq, &state).await {
                Ok(true) => debug!(candidates, seq, "roster persisted"),
                Ok(false) => debug!(seq, "newer state already saved; skipping"),
                Err(err) => warn!(error = %err, kind = ?err.kind(), "failed to save state"),
            }
        })
    }

    /// Write the current roster and wait for it. Used on shutdown and SIGHUP.
    pub async fn save_now(&self, roster: &Roster, saved_at: DateTime<Utc>) -> Result<(), StoreError> {
        let (seq, state) = {
            let map = roster.lock().await;
            (self.next_seq(), persisted_from(&map, saved_at))
        };
        self.write(seq, &state).await.map(|_| ())
    }

    fn next_seq(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// `Ok(false)` when a newer copy is already on disk.
    async fn write(&self, seq: u64, state: &PersistedState) -> Result<bool, StoreError> {
        let mut written = self.written.lock().await;
        if *written > seq {
            return Ok(false);
        }
        self.store.replace_all(state).await?;
        *written = seq;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionCandidate, MemberId};
    use crate::impls::MemoryStore;
    use chrono::TimeZone;
    use std::time::Duration;

    fn state(reason: &str) -> PersistedState {
        PersistedState::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            vec![ActionCandidate::new(MemberId::new(1), "A", false, reason)],
        )
    }

    #[tokio::test]
    async fn trigger_writes_in_background() {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::new(store.clone());

        persister.trigger(state("Unregistered.")).await.unwrap();

        assert_eq!(store.load_all().await.unwrap(), state("Unregistered."));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_older_write_never_overwrites_newer_one() {
        let store = Arc::new(MemoryStore::slow_first_write(Duration::from_millis(50)));
        let persister = Persister::new(store.clone());

        let older = persister.trigger(state("Idle 40 days."));
        let newer = persister.trigger(state("Idle 41 days."));
        older.await.unwrap();
        newer.await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.load_all().await.unwrap(), state("Idle 41 days."));
    }

    #[tokio::test(start_paused = true)]
    async fn write_issued_first_but_started_last_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::new(store.clone());

        let seq_old = persister.next_seq();
        let seq_new = persister.next_seq();
        assert!(persister.write(seq_new, &state("Idle 41 days.")).await.unwrap());
        assert!(!persister.write(seq_old, &state("Idle 40 days.")).await.unwrap());

        assert_eq!(store.load_all().await.unwrap(), state("Idle 41 days."));
        assert_eq!(store.writes().await, 1);
    }

    #[tokio::test]
    async fn save_now_copies_the_roster() {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::new(store.clone());
        let roster = Roster::new();
        roster.lock().await.insert(
            MemberId::new(3),
            ActionCandidate::new(MemberId::new(3), "C", true, "Idle 90 days."),
        );

        let saved_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        persister.save_now(&roster, saved_at).await.unwrap();

        let saved = store.load_all().await.unwrap();
        assert_eq!(saved.candidates.len(), 1);
        assert_eq!(saved.saved_at, saved_at);
    }
}
