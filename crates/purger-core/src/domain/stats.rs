use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::ActionCandidate;

/// Aggregate counts over the roster, computed under the roster lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterStats {
    pub total: usize,
    pub claimed: usize,
    pub needs_stripped: usize,
    pub needs_purged: usize,
    pub in_stasis: usize,
}

impl RosterStats {
    /// Count `candidates` as of `now`.
    ///
    /// - claimed: leased and not in stasis
    /// - in_stasis: stripped within the stasis window
    /// - needs_stripped: privileged and not in stasis
    /// - needs_purged: unprivileged and not in stasis (purged ones included)
    pub fn tally<'a>(
        candidates: impl IntoIterator<Item = &'a ActionCandidate>,
        now: DateTime<Utc>,
        lease: Duration,
        stasis: Duration,
    ) -> Self {
        let mut stats = Self::default();
        for candidate in candidates {
            stats.total += 1;

            let in_stasis = candidate.in_stasis(now, stasis);
            if in_stasis {
                stats.in_stasis += 1;
                continue;
            }
            if candidate.is_leased(now, lease) {
                stats.claimed += 1;
            }
            if candidate.has_privileges {
                stats.needs_stripped += 1;
            } else {
                stats.needs_purged += 1;
            }
        }
        stats
    }
}
