//! Lease parameters: how many candidates one claim hands out and how long
//! leases and the post-strip stasis last.

use chrono::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasePolicy {
    /// Upper bound on candidates handed out per claim.
    pub batch_size: usize,

    /// A claim older than this is treated as abandoned.
    pub lease_duration: Duration,

    /// After a strip, the candidate is left alone this long.
    pub stasis: Duration,
}

impl LeasePolicy {
    /// 10 per batch, 1 hour leases, 24 hour stasis.
    pub fn standard() -> Self {
        Self {
            batch_size: 10,
            lease_duration: Duration::hours(1),
            stasis: Duration::hours(24),
        }
    }
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_policy_values() {
        let policy = LeasePolicy::standard();
        assert_eq!(policy.batch_size, 10);
        assert_eq!(policy.lease_duration, Duration::minutes(60));
        assert_eq!(policy.stasis, Duration::hours(24));
    }
}
