//! Timestamp format used by the membership feed.
//!
//! The feed emits `YYYY-MM-DD HH:MM:SS` in UTC without an offset. Use with
//! `#[serde(with = "feed_time")]`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub const FEED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), FEED_TIME_FORMAT).map(|naive| naive.and_utc())
}

pub fn format(value: &DateTime<Utc>) -> String {
    value.format(FEED_TIME_FORMAT).to_string()
}

pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(value))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}
