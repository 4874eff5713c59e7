//! Errors - エラー型と分類
//!
//! 外部コラボレータ（feed / registry / store）ごとに 1 つの enum を持ち、
//! `kind()` で運用上の分類を返します。

use thiserror::Error;

/// ErrorKind は運用上の分類
///
/// - Transient: 次のサイクルで再試行すれば直る可能性がある（ログのみ）
/// - InvariantViolation: 対象アイテムをスキップしてログ
/// - Configuration: 起動時のみ致命的
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    InvariantViolation,
    Configuration,
}

/// Snapshot pull failed. Always transient: the engine backs off and retries
/// without touching the roster.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot request failed: {0}")]
    Request(String),

    #[error("snapshot feed returned HTTP {0}")]
    Status(u16),

    #[error("snapshot could not be decoded: {0}")]
    Decode(String),

    #[error("snapshot file unreadable: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapshotError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

/// Registry lookup failed. Never treated as authoritative non-membership.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("registry returned unexpected data: {0}")]
    BadResponse(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state not previously saved")]
    NeverSaved,

    #[error("state store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state could not be encoded or decoded: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("state store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}
