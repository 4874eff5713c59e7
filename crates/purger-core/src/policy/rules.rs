//! Membership policy: who is out of policy, who is exempt, and why.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::domain::MemberRecord;

/// Hulls whose pilots are never actioned, whatever else is true of them.
pub const EXEMPT_CATEGORIES: [&str; 8] = [
    "Aeon",
    "Nyx",
    "Hel",
    "Wyvern",
    "Avatar",
    "Erebus",
    "Ragnarok",
    "Leviathan",
];

/// Result of checking one snapshot row against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    /// Active and registered.
    InPolicy,

    /// Out of policy but protected by role, name or hull.
    Exempt,

    Violation(Violation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Whole days since last activity, when over the idle threshold.
    pub idle_days: Option<i64>,
    pub unregistered: bool,
}

impl Violation {
    /// Human-readable justification, one clause per broken rule.
    pub fn reason(&self) -> String {
        let mut clauses = Vec::with_capacity(2);
        if let Some(days) = self.idle_days {
            clauses.push(format!("Idle {days} days."));
        }
        if self.unregistered {
            clauses.push("Unregistered.".to_string());
        }
        clauses.join(" ")
    }

    /// Registration is the whole problem; registering clears it.
    pub fn unregistered_only(&self) -> bool {
        self.unregistered && self.idle_days.is_none()
    }
}

/// Policy parameters supplied by configuration.
#[derive(Debug, Clone)]
pub struct PurgePolicy {
    pub idle_threshold: Duration,

    /// A member holding every bit of any one of these masks is exempt.
    pub exempt_roles: Vec<i64>,

    /// Lowercased names.
    pub exempt_names: HashSet<String>,
}

impl PurgePolicy {
    pub fn new(idle_threshold: Duration) -> Self {
        Self {
            idle_threshold,
            exempt_roles: Vec::new(),
            exempt_names: HashSet::new(),
        }
    }

    pub fn with_idle_days(days: i64) -> Self {
        Self::new(Duration::days(days))
    }

    pub fn exempt_roles(mut self, roles: impl IntoIterator<Item = i64>) -> Self {
        self.exempt_roles = roles.into_iter().filter(|role| *role > 0).collect();
        self
    }

    pub fn exempt_names<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.exempt_names = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        self
    }

    pub fn is_exempt(&self, record: &MemberRecord) -> bool {
        if self
            .exempt_roles
            .iter()
            .any(|role| record.roles & role == *role)
        {
            return true;
        }
        if self.exempt_names.contains(&record.name.to_lowercase()) {
            return true;
        }
        EXEMPT_CATEGORIES.contains(&record.category.as_str())
    }

    /// Check one row. `registered` comes from the registry listing (or is
    /// `true` when no registry is configured).
    pub fn assess(&self, record: &MemberRecord, registered: bool, now: DateTime<Utc>) -> Assessment {
        let inactive_for = now.signed_duration_since(record.last_active_at);
        let idle = inactive_for > self.idle_threshold;

        if !idle && registered {
            return Assessment::InPolicy;
        }
        if self.is_exempt(record) {
            return Assessment::Exempt;
        }

        Assessment::Violation(Violation {
            idle_days: idle.then(|| inactive_for.num_days()),
            unregistered: !registered,
        })
    }
}
