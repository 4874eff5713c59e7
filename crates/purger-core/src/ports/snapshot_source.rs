//! SnapshotSource port - メンバー一覧の定期取得

use async_trait::async_trait;

use crate::domain::{Snapshot, SnapshotError};

/// Supplies one full roster pull on demand.
///
/// Every error is transient from the engine's point of view.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, SnapshotError>;
}
