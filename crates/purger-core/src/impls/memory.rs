//! In-memory adapters for tests and inline configuration.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::domain::{RegistryError, Snapshot, SnapshotError, StoreError};
use crate::ports::{PersistedState, RegistryProvider, SnapshotSource, StateStore};

/// Registry backed by a fixed, editable name set.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    names: RwLock<HashSet<String>>,
}

impl StaticRegistry {
    pub fn new<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: RwLock::new(
                names
                    .into_iter()
                    .map(|name| name.as_ref().trim().to_lowercase())
                    .collect(),
            ),
        }
    }

    pub async fn insert(&self, name: &str) {
        self.names.write().await.insert(name.trim().to_lowercase());
    }

    pub async fn remove(&self, name: &str) {
        self.names.write().await.remove(&name.trim().to_lowercase());
    }
}

#[async_trait]
impl RegistryProvider for StaticRegistry {
    async fn is_eligible_member(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.names.read().await.contains(&name.to_lowercase()))
    }

    async fn list_eligible_members(&self) -> Result<HashSet<String>, RegistryError> {
        Ok(self.names.read().await.clone())
    }
}

/// Registry that is always down.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableRegistry;

#[async_trait]
impl RegistryProvider for UnavailableRegistry {
    async fn is_eligible_member(&self, _name: &str) -> Result<bool, RegistryError> {
        Err(RegistryError::Unavailable("registry offline".to_string()))
    }

    async fn list_eligible_members(&self) -> Result<HashSet<String>, RegistryError> {
        Err(RegistryError::Unavailable("registry offline".to_string()))
    }
}

/// Hands out queued results in order; fails once the script runs dry.
#[derive(Debug, Default)]
pub struct ScriptedSnapshotSource {
    script: Mutex<VecDeque<Result<Snapshot, SnapshotError>>>,
}

impl ScriptedSnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, next: Result<Snapshot, SnapshotError>) {
        self.script.lock().await.push_back(next);
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSnapshotSource {
    async fn fetch(&self) -> Result<Snapshot, SnapshotError> {
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(SnapshotError::Request("script exhausted".to_string())))
    }
}

/// State store that keeps the last saved state in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<PersistedState>>,
    writes: Mutex<usize>,
    first_write_delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose first `replace_all` sleeps before writing.
    pub fn slow_first_write(delay: Duration) -> Self {
        Self {
            first_write_delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn writes(&self) -> usize {
        *self.writes.lock().await
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn replace_all(&self, state: &PersistedState) -> Result<(), StoreError> {
        let first = {
            let mut writes = self.writes.lock().await;
            *writes += 1;
            *writes == 1
        };
        if first && let Some(delay) = self.first_write_delay {
            tokio::time::sleep(delay).await;
        }
        *self.saved.lock().await = Some(state.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<PersistedState, StoreError> {
        self.saved.lock().await.clone().ok_or(StoreError::NeverSaved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn static_registry_is_case_insensitive() {
        let registry = StaticRegistry::new(["Alpha Pilot"]);
        assert!(registry.is_eligible_member("ALPHA PILOT").await.unwrap());
        assert!(!registry.is_eligible_member("Beta").await.unwrap());

        registry.remove("alpha pilot").await;
        assert!(registry.list_eligible_members().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_reports_never_saved() {
        let store = MemoryStore::new();
        assert!(matches!(store.load_all().await, Err(StoreError::NeverSaved)));

        let state = PersistedState::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), vec![]);
        store.replace_all(&state).await.unwrap();
        assert_eq!(store.load_all().await.unwrap(), state);
        assert_eq!(store.writes().await, 1);
    }

    #[tokio::test]
    async fn scripted_source_runs_dry() {
        let source = ScriptedSnapshotSource::new();
        source.push(Err(SnapshotError::Status(502))).await;

        assert!(matches!(source.fetch().await, Err(SnapshotError::Status(502))));
        assert!(matches!(source.fetch().await, Err(SnapshotError::Request(_))));
    }
}
