//! ClaimLeaseManager - strip / boot キューの lease 管理
//!
//! 操作はすべて roster のロックを取ったまま判定から書き込みまで行います。
//! Lease の期限切れはタイムスタンプ比較だけ（バックグラウンドの掃除なし）。

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{ActionQueue, CandidateView, LeaseToken, MemberId, RosterStats};
use crate::policy::LeasePolicy;
use crate::ports::{Clock, PersistedState};
use crate::roster::{Roster, persisted_from};

use super::persister::Persister;

/// Hands out, renews and settles operator leases on the shared roster.
///
/// Design:
/// - Eligibility is queue filter + "not leased" + (for unregistered-only
///   candidates) a live registration re-check.
/// - Which of several eligible candidates end up in a batch is unspecified.
/// - Unconfirmed members of a settled lease are unclaimed at once; they do
///   not wait out the lease duration.
pub struct ClaimLeaseManager {
    roster: Roster,
    policy: LeasePolicy,
    clock: Arc<dyn Clock>,
    persister: Option<Persister>,
}

impl ClaimLeaseManager {
    pub fn new(roster: Roster, policy: LeasePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            roster,
            policy,
            clock,
            persister: None,
        }
    }

    pub fn with_persister(mut self, persister: Persister) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn policy(&self) -> &LeasePolicy {
        &self.policy
    }

    /// Claim up to `batch_size` eligible candidates from `queue`.
    pub async fn acquire_lease(&self, queue: ActionQueue) -> LeaseToken {
        let now = self.clock.now();
        let mut map = self.roster.lock().await;

        let mut picked = Vec::with_capacity(self.policy.batch_size);
        for candidate in map.values_mut() {
            if picked.len() >= self.policy.batch_size {
                break;
            }
            if !queue.admits(candidate, now, self.policy.stasis)
                || candidate.is_leased(now, self.policy.lease_duration)
            {
                continue;
            }
            if let Some(check) = &candidate.registration_check
                && check.is_registered_now().await
            {
                debug!(member = %candidate.name, "registered since last pull; skipping");
                continue;
            }

            candidate.claimed_at = Some(now);
            picked.push(candidate.id);
        }

        if !picked.is_empty() {
            info!(queue = %queue, claimed = picked.len(), "lease acquired");
            self.persist(persisted_from(&map, now));
        }
        LeaseToken::new(queue, picked)
    }

    /// Settle a lease.
    ///
    /// Every leased identity still in the roster is unclaimed; the ones in
    /// `confirmed` also get their terminal mark (`stripped_at` for Strip,
    /// `purged` for Boot). Identities no longer in the roster are skipped.
    /// Repeating a confirmation changes nothing further.
    pub async fn confirm_lease(&self, queue: ActionQueue, leased: &[MemberId], confirmed: &[MemberId]) {
        let now = self.clock.now();
        let confirmed: HashSet<MemberId> = confirmed.iter().copied().collect();
        let mut map = self.roster.lock().await;

        for id in leased {
            let Some(candidate) = map.get_mut(id) else {
                debug!(id = %id, "leased member no longer in roster; skipping");
                continue;
            };

            if confirmed.contains(id) {
                match queue {
                    ActionQueue::Strip => {
                        if !candidate.in_stasis(now, self.policy.stasis) {
                            candidate.stripped_at = Some(now);
                        }
                        info!(member = %candidate.name, "confirmed stripped");
                    }
                    ActionQueue::Boot => {
                        candidate.purged = true;
                        info!(member = %candidate.name, "confirmed purged");
                    }
                }
            }
            candidate.claimed_at = None;
        }

        self.persist(persisted_from(&map, now));
    }

    /// [`ClaimLeaseManager::confirm_lease`] for a token from
    /// [`ClaimLeaseManager::acquire_lease`].
    pub async fn confirm(&self, lease: &LeaseToken, confirmed: &[MemberId]) {
        self.confirm_lease(lease.queue, &lease.members, confirmed).await;
    }

    /// Refresh a lease the operator is looking at.
    ///
    /// Members still present and still accepted by the queue get
    /// `claimed_at = now` and are returned for display; the rest are dropped
    /// from the view.
    pub async fn renew_lease(&self, lease: &LeaseToken) -> Vec<CandidateView> {
        let now = self.clock.now();
        let mut map = self.roster.lock().await;

        let mut views = Vec::with_capacity(lease.members.len());
        for id in &lease.members {
            let Some(candidate) = map.get_mut(id) else {
                continue;
            };
            if !lease.queue.admits(candidate, now, self.policy.stasis) {
                continue;
            }
            candidate.claimed_at = Some(now);
            views.push(candidate.view());
        }

        if !views.is_empty() {
            self.persist(persisted_from(&map, now));
        }
        views
    }

    pub async fn snapshot_stats(&self) -> RosterStats {
        let now = self.clock.now();
        let map = self.roster.lock().await;
        RosterStats::tally(map.values(), now, self.policy.lease_duration, self.policy.stasis)
    }

    /// `(name, reason)` for every candidate, sorted by name.
    pub async fn candidate_summaries(&self) -> Vec<(String, String)> {
        let map = self.roster.lock().await;
        let mut summaries: Vec<(String, String)> = map
            .values()
            .map(|candidate| (candidate.name.clone(), candidate.reason.clone()))
            .collect();
        summaries.sort();
        summaries
    }

    fn persist(&self, state: PersistedState) {
        if let Some(persister) = &self.persister {
            persister.trigger(state);
        }
    }
}
