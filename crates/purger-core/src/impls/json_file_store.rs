//! JsonFileStore - 状態を JSON ファイル 1 つに保存
//!
//! 書き込みは同じディレクトリの一時ファイル → fsync → rename。途中で
//! 落ちても前回の状態か今回の状態のどちらかが残ります。

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::StoreError;
use crate::ports::{PersistedState, StateStore};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn replace_all(&self, state: &PersistedState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let path = self.path.clone();

        // blocking I/O は spawn_blocking に逃がす
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn load_all(&self) -> Result<PersistedState, StoreError> {
        let path = self.path.clone();
        let bytes = tokio::task::spawn_blocking(move || std::fs::read(path))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StoreError::NeverSaved,
                _ => StoreError::Io(e),
            })?;

        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.as_file_mut().write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionCandidate, MemberId};
    use chrono::{TimeZone, Utc};

    fn state(reason: &str) -> PersistedState {
        let mut candidate = ActionCandidate::new(MemberId::new(7), "Sleeper", false, reason);
        candidate.stripped_at = Some(Utc.with_ymd_and_hms(2024, 5, 30, 8, 0, 0).unwrap());
        PersistedState::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(), vec![candidate])
    }

    #[tokio::test]
    async fn missing_file_is_never_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        assert!(matches!(store.load_all().await, Err(StoreError::NeverSaved)));
    }

    #[tokio::test]
    async fn replace_all_overwrites_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));

        store.replace_all(&state("Idle 40 days.")).await.unwrap();
        store.replace_all(&state("Idle 41 days.")).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded, state("Idle 41 days."));

        let leftovers = std::fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();

        let store = JsonFileStore::new(path);
        assert!(matches!(store.load_all().await, Err(StoreError::Encoding(_))));
    }
}
