//! PurgerBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 必須の collaborator が無ければ build() で BuildError

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::info;

use crate::domain::{ErrorKind, StoreError};
use crate::policy::{LeasePolicy, PurgePolicy};
use crate::ports::{Clock, RegistryProvider, SnapshotSource, StateStore, SystemClock};
use crate::roster::Roster;

use super::claims::ClaimLeaseManager;
use super::persister::Persister;
use super::reconciler::{ReconciliationEngine, Schedule};

/// PurgerBuilder は Purger を構築
///
/// # 使用例
/// ```ignore
/// let purger = PurgerBuilder::new()
///     .snapshot_source(Arc::new(source))
///     .purge_policy(PurgePolicy::with_idle_days(30))
///     .state_store(Arc::new(JsonFileStore::new("purger-state.json")))
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - snapshot source と purge policy は必須
/// - registry / state store は省略可（省略時: 全員登録済み / 保存しない）
#[derive(Default)]
pub struct PurgerBuilder {
    source: Option<Arc<dyn SnapshotSource>>,
    registry: Option<Arc<dyn RegistryProvider>>,
    store: Option<Arc<dyn StateStore>>,
    clock: Option<Arc<dyn Clock>>,
    purge_policy: Option<PurgePolicy>,
    lease_policy: LeasePolicy,
    schedule: Schedule,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no snapshot source configured")]
    MissingSnapshotSource,

    #[error("no purge policy configured")]
    MissingPolicy,

    #[error("lease batch size must be at least 1")]
    EmptyBatch,
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

impl PurgerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn RegistryProvider>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 省略時は SystemClock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn purge_policy(mut self, policy: PurgePolicy) -> Self {
        self.purge_policy = Some(policy);
        self
    }

    pub fn lease_policy(mut self, policy: LeasePolicy) -> Self {
        self.lease_policy = policy;
        self
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn build(self) -> Result<Purger, BuildError> {
        let source = self.source.ok_or(BuildError::MissingSnapshotSource)?;
        let purge_policy = self.purge_policy.ok_or(BuildError::MissingPolicy)?;
        if self.lease_policy.batch_size == 0 {
            return Err(BuildError::EmptyBatch);
        }
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let roster = Roster::new();
        let persister = self.store.map(Persister::new);

        let mut engine = ReconciliationEngine::new(source, roster.clone(), purge_policy, Arc::clone(&clock))
            .with_lease_policy(self.lease_policy.clone())
            .with_schedule(self.schedule);
        if let Some(registry) = &self.registry {
            engine = engine.with_registry(Arc::clone(registry));
        }

        let mut claims = ClaimLeaseManager::new(roster.clone(), self.lease_policy, Arc::clone(&clock));
        if let Some(persister) = &persister {
            engine = engine.with_persister(persister.clone());
            claims = claims.with_persister(persister.clone());
        }

        Ok(Purger {
            roster,
            engine: Arc::new(engine),
            claims,
            persister,
            registry: self.registry,
            clock,
        })
    }
}

/// Purger は組み立て済みのアプリケーション
///
/// - engine: バックグラウンドの reconciliation loop
/// - claims: オペレーター向けの claim / confirm / renew / stats
pub struct Purger {
    roster: Roster,
    engine: Arc<ReconciliationEngine>,
    claims: ClaimLeaseManager,
    persister: Option<Persister>,
    registry: Option<Arc<dyn RegistryProvider>>,
    clock: Arc<dyn Clock>,
}

impl Purger {
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    pub fn claims(&self) -> &ClaimLeaseManager {
        &self.claims
    }

    /// 保存済みの状態を roster に読み込む。返り値は復元した件数。
    ///
    /// 一度も保存されていなければ空の roster のまま 0 を返します。
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let Some(persister) = &self.persister else {
            return Ok(0);
        };
        match persister.store().load_all().await {
            Ok(state) => {
                let restored = self.roster.restore(state, self.registry.as_ref()).await;
                info!(restored, "restored saved state");
                Ok(restored)
            }
            Err(StoreError::NeverSaved) => {
                info!("no saved state; starting empty");
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    /// reconciliation loop を起動。止めるときは handle を abort。
    pub fn spawn_reconciliation(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move { engine.run().await })
    }

    /// 状態をすぐに保存（shutdown / SIGHUP 用）。store が無ければ何もしない。
    pub async fn save_now(&self) -> Result<(), StoreError> {
        match &self.persister {
            Some(persister) => persister.save_now(&self.roster, self.now()).await,
            None => Ok(()),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
