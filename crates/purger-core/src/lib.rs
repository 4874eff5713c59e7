//! purger-core
//!
//! Core building blocks for the membership purger: pull the member list,
//! decide who is out of policy, and hand candidates to operators through
//! leased strip / boot queues.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, member, candidate, queue, lease, stats, errors）
//! - **ports**: 抽象化レイヤー（SnapshotSource, RegistryProvider, StateStore, Clock）
//! - **policy**: idle / exemption ルールと lease パラメータ
//! - **roster**: ロックで守られた候補マップ
//! - **app**: アプリケーションロジック（builder, reconciler, claims, persister）
//! - **impls**: 実装（HTTP / ファイル / メモリ）

pub mod app;
pub mod domain;
pub mod impls;
pub mod policy;
pub mod ports;
pub mod roster;

pub use crate::app::{ClaimLeaseManager, Purger, PurgerBuilder, ReconciliationEngine};
pub use crate::roster::Roster;
