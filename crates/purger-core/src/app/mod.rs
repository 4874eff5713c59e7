//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **PurgerBuilder**: アプリケーションの構築とワイヤリング
//! - **ReconciliationEngine**: snapshot の取得と roster の差し替え（ループ）
//! - **ClaimLeaseManager**: strip / boot キューの claim・confirm・renew・stats
//! - **Persister**: 変更後の非同期保存

pub mod builder;
pub mod claims;
pub mod persister;
pub mod reconciler;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, Purger, PurgerBuilder};
pub use self::claims::ClaimLeaseManager;
pub use self::persister::Persister;
pub use self::reconciler::{CycleReport, ReconciliationEngine, Schedule};
