//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。コアが外部に求める能力だけを
//! trait として定義し、実装は `impls` に置きます。
//!
//! - SnapshotSource: メンバー一覧の取得
//! - RegistryProvider: 登録済みかどうか
//! - StateStore: 候補一覧の永続化
//! - Clock: 現在時刻

pub mod clock;
pub mod registry;
pub mod snapshot_source;
pub mod state_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::registry::RegistryProvider;
pub use self::snapshot_source::SnapshotSource;
pub use self::state_store::{PERSISTED_STATE_VERSION, PersistedState, StateStore};
