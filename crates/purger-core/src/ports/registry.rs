//! RegistryProvider port - 登録済みメンバーの問い合わせ
//!
//! 実装:
//! - HttpListRegistry（定期更新される平文リスト）
//! - StaticRegistry（テスト・インライン設定用）
//! - SQL 版はこのクレートの外

use std::collections::HashSet;

use async_trait::async_trait;

use crate::domain::RegistryError;

/// Who counts as a registered member.
///
/// Names in `list_eligible_members` are lowercased; callers compare
/// case-insensitively. Implementations may cache with their own refresh
/// policy and must tolerate concurrent calls.
#[async_trait]
pub trait RegistryProvider: Send + Sync {
    async fn is_eligible_member(&self, name: &str) -> Result<bool, RegistryError>;

    async fn list_eligible_members(&self) -> Result<HashSet<String>, RegistryError>;
}
