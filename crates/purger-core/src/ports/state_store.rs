//! StateStore port - 候補一覧の永続化
//!
//! 契約は「全体を置き換える」「全体を読み込む」の 2 つだけ。
//! in-memory の roster が常に正本で、ストアはベストエフォート。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ActionCandidate, StoreError};

pub const PERSISTED_STATE_VERSION: u32 = 1;

/// The whole roster as written to durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub candidates: Vec<ActionCandidate>,
}

impl PersistedState {
    pub fn new(saved_at: DateTime<Utc>, candidates: Vec<ActionCandidate>) -> Self {
        Self {
            version: PERSISTED_STATE_VERSION,
            saved_at,
            candidates,
        }
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Replace everything previously saved.
    async fn replace_all(&self, state: &PersistedState) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NeverSaved`] when nothing was ever written.
    async fn load_all(&self) -> Result<PersistedState, StoreError>;
}
