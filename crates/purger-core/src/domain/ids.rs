//! Domain identifiers.
//!
//! The feed identifies members by an opaque integer. Wrapping it keeps member
//! ids from being mixed up with counts, role bits or timestamps, all of which
//! are also plain integers in the feed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of a roster member as reported by the snapshot feed.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(i64);

impl MemberId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for MemberId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemberId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_surrounding_whitespace() {
        let id: MemberId = " 90000001 ".parse().unwrap();
        assert_eq!(id, MemberId::new(90_000_001));
        assert_eq!(id.to_string(), "90000001");
    }

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&MemberId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
