//! Action candidates: out-of-policy members plus their remediation state.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ids::MemberId;
use super::member::MemberRecord;
use crate::ports::RegistryProvider;

/// Live "is this member registered now?" check.
///
/// Holds the registry capability and the member's display name rather than a
/// cached answer: a member may register while its candidate is still queued,
/// and the claim manager must see that.
#[derive(Clone)]
pub struct RegistrationCheck {
    registry: Arc<dyn RegistryProvider>,
    name: String,
}

impl RegistrationCheck {
    pub fn new(registry: Arc<dyn RegistryProvider>, name: impl Into<String>) -> Self {
        Self {
            registry,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the registry again.
    ///
    /// A registry failure counts as registered: an outage must never make a
    /// member look removable.
    pub async fn is_registered_now(&self) -> bool {
        match self.registry.is_eligible_member(&self.name).await {
            Ok(registered) => registered,
            Err(err) => {
                warn!(member = %self.name, error = %err, "registration re-check failed; treating as registered");
                true
            }
        }
    }
}

impl fmt::Debug for RegistrationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationCheck")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for RegistrationCheck {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && std::ptr::eq(
                Arc::as_ptr(&self.registry) as *const (),
                Arc::as_ptr(&other.registry) as *const (),
            )
    }
}

/// A member currently out of policy, keyed by identity in the roster.
///
/// Policy fields (`has_privileges`, `reason`, `purged`) are recomputed on every
/// reconciliation; `stripped_at` and `claimed_at` are carried over from the
/// previous cycle (see [`ActionCandidate::carry_over`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCandidate {
    pub id: MemberId,
    pub name: String,

    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: String,

    pub has_privileges: bool,

    /// Set once privileges are confirmed removed.
    #[serde(default)]
    pub stripped_at: Option<DateTime<Utc>>,

    /// Set while an operator holds a lease on this candidate.
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,

    /// Membership removal confirmed.
    #[serde(default)]
    pub purged: bool,

    pub reason: String,

    /// "Unregistered" is the only violation. Persisted so the live check can
    /// be rebound after a restart.
    #[serde(default)]
    pub unregistered_only: bool,

    #[serde(skip)]
    pub registration_check: Option<RegistrationCheck>,
}

impl ActionCandidate {
    pub fn new(
        id: MemberId,
        name: impl Into<String>,
        has_privileges: bool,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            joined_at: None,
            last_active_at: None,
            category: String::new(),
            has_privileges,
            stripped_at: None,
            claimed_at: None,
            purged: false,
            reason: reason.into(),
            unregistered_only: false,
            registration_check: None,
        }
    }

    /// Fresh candidate for a snapshot row, before any carry-over.
    pub fn from_record(record: &MemberRecord, reason: impl Into<String>) -> Self {
        let mut candidate = Self::new(record.id, record.name.clone(), record.has_privileges(), reason);
        candidate.joined_at = Some(record.joined_at);
        candidate.last_active_at = Some(record.last_active_at);
        candidate.category = record.category.clone();
        candidate
    }

    /// Attach the live registration check. Only meaningful for
    /// unregistered-only candidates.
    pub fn bind_registration(&mut self, registry: Arc<dyn RegistryProvider>) {
        self.unregistered_only = true;
        self.registration_check = Some(RegistrationCheck::new(registry, self.name.clone()));
    }

    /// Fold the previous cycle's entry for the same identity into this one.
    ///
    /// - `claimed_at` survives as-is.
    /// - `stripped_at` survives only while no privileges are reported.
    /// - privileges present last cycle and gone now means the strip just
    ///   happened: `stripped_at = now`.
    pub fn carry_over(&mut self, previous: &ActionCandidate, now: DateTime<Utc>) {
        if previous.stripped_at.is_some() && !self.has_privileges {
            self.stripped_at = previous.stripped_at;
        }
        if previous.claimed_at.is_some() {
            self.claimed_at = previous.claimed_at;
        }
        if previous.has_privileges && !self.has_privileges {
            self.stripped_at = Some(now);
        }
    }

    /// Stripped within the stasis window.
    pub fn in_stasis(&self, now: DateTime<Utc>, stasis: Duration) -> bool {
        within(self.stripped_at, now, stasis)
    }

    /// Claimed within the lease duration.
    pub fn is_leased(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        within(self.claimed_at, now, lease)
    }

    pub fn view(&self) -> CandidateView {
        CandidateView {
            id: self.id,
            name: self.name.clone(),
            joined_at: self.joined_at,
            last_active_at: self.last_active_at,
            category: self.category.clone(),
            has_privileges: self.has_privileges,
            stripped_at: self.stripped_at,
            claimed_at: self.claimed_at,
            purged: self.purged,
            reason: self.reason.clone(),
        }
    }
}

fn within(at: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    at.is_some_and(|at| now.signed_duration_since(at) <= window)
}

/// Display copy of a candidate for the operator-facing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateView {
    pub id: MemberId,
    pub name: String,
    pub joined_at: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub category: String,
    pub has_privileges: bool,
    pub stripped_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub purged: bool,
    pub reason: String,
}
