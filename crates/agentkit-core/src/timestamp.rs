//! Timestamps in data files shared with hook scripts.
//!
//! We write RFC 3339. Hook scripts write naive local ISO-8601
//! (`2026-10-18T09:30:00.123456`), which is read as local time.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Parse an RFC 3339 timestamp, or a naive one taken as local time.
pub fn parse(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    // A time skipped by a DST jump has no local reading; take it as UTC.
    Some(
        Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| Local.from_utc_datetime(&naive)),
    )
}

pub fn serialize<S: Serializer>(t: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
    t.serialize(s)
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Local>, D::Error> {
    let raw = String::deserialize(d)?;
    parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
}

/// For `Option<DateTime<Local>>` fields; `null` reads as `None`.
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(t: &Option<DateTime<Local>>, s: S) -> Result<S::Ok, S::Error> {
        t.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Local>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(raw) => super::parse(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'"))),
        }
    }
}
