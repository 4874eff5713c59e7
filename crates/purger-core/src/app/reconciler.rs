//! ReconciliationEngine - snapshot → policy → merge → commit → persist
//!
//! # フロー
//! 1. SnapshotSource::fetch()（ロックなし）
//! 2. RegistryProvider::list_eligible_members()（ロックなし）
//! 3. PurgePolicy で各行を評価し、新しい候補を組み立てる（ロックなし）
//! 4. ロックを 1 回だけ取り、前回の候補から carry-over して丸ごと差し替え
//! 5. Persister で非同期に保存
//! 6. validUntil + grace まで sleep
//!
//! 失敗時は roster に触れず、retry_backoff 後に 1 からやり直します。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::domain::{ActionCandidate, ErrorKind, RosterStats, Snapshot, SnapshotError, feed_time};
use crate::policy::{Assessment, LeasePolicy, PurgePolicy};
use crate::ports::{Clock, RegistryProvider, SnapshotSource};
use crate::roster::{CandidateMap, Roster, persisted_from};

use super::persister::Persister;

/// Timing of the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Added to the snapshot's expiry before the next pull.
    pub grace: Duration,

    /// Wait after a failed pull. Does not advance the schedule.
    pub retry_backoff: Duration,
}

impl Schedule {
    /// 30 second grace, 60 second backoff.
    pub fn standard() -> Self {
        Self {
            grace: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(60),
        }
    }

    /// How long to sleep after a successful pull.
    pub fn delay_until_next(&self, valid_until: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let remaining = valid_until
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        remaining + self.grace
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::standard()
    }
}

/// What one committed cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub reconciled_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub members_seen: usize,
    pub candidates: usize,
    pub exempt: usize,
    /// Violations that produced no reason. Always a bug; never surfaced.
    pub dropped: usize,
    /// Counts over the roster right after the swap.
    pub stats: RosterStats,
}

pub struct ReconciliationEngine {
    source: Arc<dyn SnapshotSource>,
    registry: Option<Arc<dyn RegistryProvider>>,
    roster: Roster,
    persister: Option<Persister>,
    policy: PurgePolicy,
    lease: LeasePolicy,
    clock: Arc<dyn Clock>,
    schedule: Schedule,
}

impl ReconciliationEngine {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        roster: Roster,
        policy: PurgePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            registry: None,
            roster,
            persister: None,
            policy,
            lease: LeasePolicy::standard(),
            clock,
            schedule: Schedule::standard(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn RegistryProvider>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_persister(mut self, persister: Persister) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Lease parameters used only for the post-commit stats.
    pub fn with_lease_policy(mut self, lease: LeasePolicy) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Run forever. There is no cancellation; the loop lives as long as the
    /// process (abort the task to stop it).
    pub async fn run(&self) {
        loop {
            let delay = match self.run_cycle().await {
                Ok(report) => {
                    let now = self.clock.now();
                    info!(
                        total = report.stats.total,
                        claimed = report.stats.claimed,
                        needs_purged = report.stats.needs_purged,
                        needs_stripped = report.stats.needs_stripped,
                        in_stasis = report.stats.in_stasis,
                        exempt = report.exempt,
                        next_pull = %feed_time::format(&report.valid_until),
                        "reconciliation done"
                    );
                    self.schedule.delay_until_next(report.valid_until, now)
                }
                Err(err) => {
                    warn!(error = %err, kind = ?err.kind(), "snapshot pull failed; retrying");
                    self.schedule.retry_backoff
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// One pull-evaluate-merge-commit-persist pass.
    ///
    /// On error the roster is left untouched.
    pub async fn run_cycle(&self) -> Result<CycleReport, SnapshotError> {
        info!("pulling current member list");
        let snapshot = self.source.fetch().await?;
        let registered = self.registered_names().await;
        let now = self.clock.now();

        let evaluated = self.evaluate(&snapshot, registered.as_ref(), now);
        let candidates = evaluated.candidates.len();

        let stats = {
            let mut current = self.roster.lock().await;
            let next = merge(evaluated.candidates, &current, now);
            *current = next;
            if let Some(persister) = &self.persister {
                persister.trigger(persisted_from(&current, now));
            }
            RosterStats::tally(current.values(), now, self.lease.lease_duration, self.lease.stasis)
        };

        Ok(CycleReport {
            reconciled_at: now,
            valid_until: snapshot.valid_until,
            members_seen: snapshot.members.len(),
            candidates,
            exempt: evaluated.exempt,
            dropped: evaluated.dropped,
            stats,
        })
    }

    /// `None` means "treat everyone as registered": either no registry is
    /// configured or it could not be reached.
    async fn registered_names(&self) -> Option<HashSet<String>> {
        let registry = self.registry.as_ref()?;
        match registry.list_eligible_members().await {
            Ok(names) => Some(names),
            Err(err) => {
                warn!(error = %err, "registry unavailable; treating every member as registered this cycle");
                None
            }
        }
    }

    fn evaluate(
        &self,
        snapshot: &Snapshot,
        registered: Option<&HashSet<String>>,
        now: DateTime<Utc>,
    ) -> Evaluated {
        let mut out = Evaluated::default();

        for record in &snapshot.members {
            let is_registered =
                registered.is_none_or(|names| names.contains(&record.name.to_lowercase()));

            let violation = match self.policy.assess(record, is_registered, now) {
                Assessment::InPolicy => continue,
                Assessment::Exempt => {
                    out.exempt += 1;
                    continue;
                }
                Assessment::Violation(violation) => violation,
            };

            let reason = violation.reason();
            if reason.is_empty() {
                error!(
                    member = %record.name,
                    id = %record.id,
                    kind = ?ErrorKind::InvariantViolation,
                    "member is out of policy but no reason was produced; dropping"
                );
                out.dropped += 1;
                continue;
            }

            let mut candidate = ActionCandidate::from_record(record, reason);
            if violation.unregistered_only()
                && let Some(registry) = &self.registry
            {
                candidate.bind_registration(Arc::clone(registry));
            }
            out.candidates.push(candidate);
        }

        out
    }
}

#[derive(Default)]
struct Evaluated {
    candidates: Vec<ActionCandidate>,
    exempt: usize,
    dropped: usize,
}

/// Build the replacement roster: fresh candidates with `stripped_at` /
/// `claimed_at` carried over from `previous`. Identities missing from
/// `fresh` are gone; they are back in policy.
pub fn merge(fresh: Vec<ActionCandidate>, previous: &CandidateMap, now: DateTime<Utc>) -> CandidateMap {
    let mut next = CandidateMap::with_capacity(fresh.len());
    for mut candidate in fresh {
        if let Some(prev) = previous.get(&candidate.id) {
            candidate.carry_over(prev, now);
        }
        if next.insert(candidate.id, candidate).is_some() {
            debug!("snapshot listed a member twice; keeping the last row");
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MemberId, MemberRecord};
    use crate::impls::{MemoryStore, ScriptedSnapshotSource, StaticRegistry, UnavailableRegistry};
    use crate::ports::{FixedClock, StateStore};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn member(id: i64, name: &str, idle_days: i64, roles: i64) -> MemberRecord {
        MemberRecord {
            id: MemberId::new(id),
            name: name.to_string(),
            joined_at: t0() - ChronoDuration::days(365),
            last_active_at: t0() - ChronoDuration::days(idle_days),
            category: "Rifter".to_string(),
            roles,
            grantable_roles: 0,
        }
    }

    fn snapshot(members: Vec<MemberRecord>) -> Snapshot {
        Snapshot {
            valid_until: t0() + ChronoDuration::hours(6),
            members,
        }
    }

    struct Fixture {
        source: Arc<ScriptedSnapshotSource>,
        clock: FixedClock,
        engine: ReconciliationEngine,
    }

    fn fixture(registry: Option<Arc<dyn RegistryProvider>>) -> Fixture {
        let source = Arc::new(ScriptedSnapshotSource::new());
        let clock = FixedClock::new(t0());
        let policy = PurgePolicy::with_idle_days(30).exempt_names(["the ceo"]);
        let mut engine =
            ReconciliationEngine::new(source.clone(), Roster::new(), policy, Arc::new(clock.clone()));
        if let Some(registry) = registry {
            engine = engine.with_registry(registry);
        }
        Fixture { source, clock, engine }
    }

    #[tokio::test]
    async fn idle_privileged_member_becomes_fresh_candidate() {
        let f = fixture(None);
        f.source.push(Ok(snapshot(vec![member(1, "A", 45, 8)]))).await;

        let report = f.engine.run_cycle().await.unwrap();

        assert_eq!(report.candidates, 1);
        assert_eq!(report.stats.needs_stripped, 1);
        let a = f.engine.roster().get(MemberId::new(1)).await.unwrap();
        assert!(a.reason.contains("Idle 45 days."));
        assert!(a.has_privileges);
        assert_eq!(a.stripped_at, None);
        assert_eq!(a.claimed_at, None);
        assert!(a.registration_check.is_none());
    }

    #[tokio::test]
    async fn privileges_vanishing_sets_strip_time_to_now() {
        let f = fixture(None);
        f.source.push(Ok(snapshot(vec![member(1, "A", 45, 8)]))).await;
        f.engine.run_cycle().await.unwrap();

        f.clock.advance(ChronoDuration::hours(6));
        f.source.push(Ok(snapshot(vec![member(1, "A", 45, 0)]))).await;
        f.engine.run_cycle().await.unwrap();

        let a = f.engine.roster().get(MemberId::new(1)).await.unwrap();
        assert!(!a.has_privileges);
        assert_eq!(a.stripped_at, Some(t0() + ChronoDuration::hours(6)));
    }

    #[tokio::test]
    async fn members_back_in_policy_are_forgiven() {
        let f = fixture(None);
        f.source
            .push(Ok(snapshot(vec![member(1, "A", 45, 0), member(2, "B", 60, 0)])))
            .await;
        f.engine.run_cycle().await.unwrap();

        f.source
            .push(Ok(snapshot(vec![member(1, "A", 0, 0), member(2, "B", 61, 0)])))
            .await;
        f.engine.run_cycle().await.unwrap();

        assert!(f.engine.roster().get(MemberId::new(1)).await.is_none());
        assert!(f.engine.roster().get(MemberId::new(2)).await.is_some());
        assert_eq!(f.engine.roster().len().await, 1);
    }

    #[tokio::test]
    async fn claims_survive_reconciliation_but_purged_does_not() {
        let f = fixture(None);
        f.source.push(Ok(snapshot(vec![member(1, "A", 45, 0)]))).await;
        f.engine.run_cycle().await.unwrap();
        {
            let mut map = f.engine.roster().lock().await;
            let a = map.get_mut(&MemberId::new(1)).unwrap();
            a.claimed_at = Some(t0());
            a.purged = true;
        }

        f.source.push(Ok(snapshot(vec![member(1, "A", 46, 0)]))).await;
        f.engine.run_cycle().await.unwrap();

        let a = f.engine.roster().get(MemberId::new(1)).await.unwrap();
        assert_eq!(a.claimed_at, Some(t0()));
        assert!(!a.purged);
        assert_eq!(a.reason, "Idle 46 days.");
    }

    #[tokio::test]
    async fn exempt_members_never_become_candidates() {
        let registry: Arc<dyn RegistryProvider> = Arc::new(StaticRegistry::new(Vec::<String>::new()));
        let f = fixture(Some(registry));
        let mut titan = member(2, "Whale", 400, 0);
        titan.category = "Erebus".to_string();
        f.source
            .push(Ok(snapshot(vec![member(1, "The CEO", 400, 0), titan])))
            .await;

        let report = f.engine.run_cycle().await.unwrap();

        assert_eq!(report.exempt, 2);
        assert!(f.engine.roster().is_empty().await);
    }

    #[tokio::test]
    async fn unregistered_only_candidates_get_a_live_check() {
        let registry = Arc::new(StaticRegistry::new(["Registered Idler"]));
        let f = fixture(Some(registry.clone()));
        f.source
            .push(Ok(snapshot(vec![
                member(1, "Newbie", 1, 0),
                member(2, "Ghost", 90, 0),
                member(3, "Registered Idler", 90, 0),
                member(4, "Registered Active", 1, 0),
            ])))
            .await;
        registry.insert("registered active").await;

        f.engine.run_cycle().await.unwrap();
        let roster = f.engine.roster();

        let newbie = roster.get(MemberId::new(1)).await.unwrap();
        assert_eq!(newbie.reason, "Unregistered.");
        assert!(newbie.registration_check.is_some());

        let ghost = roster.get(MemberId::new(2)).await.unwrap();
        assert_eq!(ghost.reason, "Idle 90 days. Unregistered.");
        assert!(ghost.registration_check.is_none());

        let idler = roster.get(MemberId::new(3)).await.unwrap();
        assert_eq!(idler.reason, "Idle 90 days.");

        assert!(roster.get(MemberId::new(4)).await.is_none());
    }

    #[tokio::test]
    async fn registry_outage_treats_everyone_as_registered() {
        let f = fixture(Some(Arc::new(UnavailableRegistry)));
        f.source
            .push(Ok(snapshot(vec![member(1, "Newbie", 1, 0), member(2, "Old", 90, 0)])))
            .await;

        f.engine.run_cycle().await.unwrap();

        assert!(f.engine.roster().get(MemberId::new(1)).await.is_none());
        let old = f.engine.roster().get(MemberId::new(2)).await.unwrap();
        assert_eq!(old.reason, "Idle 90 days.");
    }

    #[tokio::test]
    async fn failed_pull_leaves_roster_untouched() {
        let f = fixture(None);
        f.source.push(Ok(snapshot(vec![member(1, "A", 45, 0)]))).await;
        f.engine.run_cycle().await.unwrap();

        f.source.push(Err(SnapshotError::Decode("truncated".into()))).await;
        let err = f.engine.run_cycle().await.unwrap_err();

        assert!(matches!(err, SnapshotError::Decode(_)));
        assert_eq!(f.engine.roster().len().await, 1);
    }

    #[tokio::test]
    async fn every_committed_candidate_has_a_reason() {
        let registry = Arc::new(StaticRegistry::new(["b"]));
        let f = fixture(Some(registry));
        let members = (0..40)
            .map(|i| member(i, if i % 2 == 0 { "a" } else { "b" }, i * 3, i % 3))
            .collect();
        f.source.push(Ok(snapshot(members))).await;

        f.engine.run_cycle().await.unwrap();

        let map = f.engine.roster().lock().await;
        assert!(!map.is_empty());
        assert!(map.values().all(|c| !c.reason.is_empty()));
    }

    #[tokio::test]
    async fn commit_triggers_persistence() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture(None);
        let engine = f.engine.with_persister(Persister::new(store.clone()));
        f.source.push(Ok(snapshot(vec![member(1, "A", 45, 0)]))).await;

        engine.run_cycle().await.unwrap();

        let mut saved = None;
        for _ in 0..50 {
            if let Ok(state) = store.load_all().await {
                saved = Some(state);
                break;
            }
            tokio::task::yield_now().await;
        }
        let saved = saved.expect("state persisted");
        assert_eq!(saved.candidates.len(), 1);
        assert_eq!(saved.saved_at, t0());
    }

    #[test]
    fn next_pull_waits_for_expiry_plus_grace() {
        let schedule = Schedule::standard();
        assert_eq!(
            schedule.delay_until_next(t0() + ChronoDuration::minutes(10), t0()),
            Duration::from_secs(630)
        );
        assert_eq!(
            schedule.delay_until_next(t0() - ChronoDuration::minutes(10), t0()),
            Duration::from_secs(30)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_retries_after_backoff() {
        let f = fixture(None);
        f.source.push(Err(SnapshotError::Status(503))).await;
        f.source.push(Ok(snapshot(vec![member(1, "A", 45, 0)]))).await;

        let engine = Arc::new(f.engine);
        let task = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run().await }
        });

        tokio::time::sleep(Duration::from_secs(61)).await;
        task.abort();

        assert_eq!(f.source.remaining().await, 0);
        assert_eq!(engine.roster().len().await, 1);
    }
}
