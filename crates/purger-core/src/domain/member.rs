//! Raw member rows and the snapshot that carries them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::feed_time;
use super::ids::MemberId;

/// One row of a snapshot pull.
///
/// Produced fresh every pull and never mutated. Discarded once it has been
/// folded into the candidate roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    #[serde(rename = "character_id")]
    pub id: MemberId,

    pub name: String,

    #[serde(rename = "start_date_time", with = "feed_time")]
    pub joined_at: DateTime<Utc>,

    #[serde(rename = "logon_date_time", with = "feed_time")]
    pub last_active_at: DateTime<Utc>,

    /// Hull (category) the member was last seen in.
    #[serde(rename = "ship_type", default)]
    pub category: String,

    #[serde(default)]
    pub roles: i64,

    #[serde(default)]
    pub grantable_roles: i64,
}

impl MemberRecord {
    /// Any role bit, held or grantable, counts as elevated access.
    pub fn has_privileges(&self) -> bool {
        self.roles != 0 || self.grantable_roles != 0
    }
}

/// A timestamped batch of member rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "cached_until", with = "feed_time")]
    pub valid_until: DateTime<Utc>,

    #[serde(default)]
    pub members: Vec<MemberRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn decodes_feed_document() {
        let body = r#"{
            "cached_until": "2014-03-10 12:00:00",
            "members": [
                {
                    "character_id": 90000001,
                    "name": "Some Pilot",
                    "start_date_time": "2012-01-01 00:00:00",
                    "logon_date_time": "2014-03-01 20:15:00",
                    "ship_type": "Rifter",
                    "roles": 0,
                    "grantable_roles": 128
                }
            ]
        }"#;

        let snapshot: Snapshot = serde_json::from_str(body).unwrap();
        assert_eq!(
            snapshot.valid_until,
            Utc.with_ymd_and_hms(2014, 3, 10, 12, 0, 0).unwrap()
        );
        assert_eq!(snapshot.members.len(), 1);

        let member = &snapshot.members[0];
        assert_eq!(member.id, MemberId::new(90_000_001));
        assert_eq!(member.category, "Rifter");
        assert!(member.has_privileges());
    }

    #[test]
    fn missing_role_fields_mean_no_privileges() {
        let body = r#"{
            "character_id": 7,
            "name": "Quiet",
            "start_date_time": "2012-01-01 00:00:00",
            "logon_date_time": "2012-01-02 00:00:00"
        }"#;

        let member: MemberRecord = serde_json::from_str(body).unwrap();
        assert!(!member.has_privileges());
        assert!(member.category.is_empty());
    }
}
