//! Impls - ports の実装
//!
//! - **HttpListRegistry**: 平文リストによる登録チェック（本番用）
//! - **HttpSnapshotSource** / **FileSnapshotSource**: メンバー一覧の取得
//! - **JsonFileStore**: 状態の永続化（本番用）
//! - **memory**: StaticRegistry, MemoryStore, ScriptedSnapshotSource（テスト・開発用）
//!
//! SQL で登録を確認する版はこのクレートには含めません。

pub mod http_registry;
pub mod json_file_store;
pub mod memory;
pub mod snapshot;

pub use self::http_registry::HttpListRegistry;
pub use self::json_file_store::JsonFileStore;
pub use self::memory::{MemoryStore, ScriptedSnapshotSource, StaticRegistry, UnavailableRegistry};
pub use self::snapshot::{FeedEndpoint, FileSnapshotSource, HttpSnapshotSource};
