use chrono::{NaiveDateTime, Timelike};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use utoipa::ToSchema;

/// Width of the timestamp bucket that identifies a mobile punch.
pub const MOBILE_BUCKET_MINUTES: i64 = 5;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, AsRefStr, EnumString,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    Unknown,
}

impl Direction {
    /// Vendor terminals report `punch_state` as "0" (check-in) / "1" (check-out).
    pub fn from_vendor_state(state: &str) -> Self {
        match state.trim() {
            "0" => Direction::In,
            "1" => Direction::Out,
            _ => Direction::Unknown,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, AsRefStr, EnumString,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IngestSource {
    Poll,
    Heal,
    Mobile,
}

/// A punch as seen by the ingest pipeline. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPunchEvent {
    /// Vendor-monotonic id; `None` for mobile punches.
    pub external_id: Option<i64>,
    pub employee_code: String,
    pub punch_time: NaiveDateTime,
    pub direction: Direction,
    pub source: IngestSource,
    pub ingested_at: NaiveDateTime,
}

impl RawPunchEvent {
    pub fn dedup_key(&self) -> DedupKey {
        match self.external_id {
            Some(id) => DedupKey::External(id),
            None => DedupKey::Mobile {
                employee_code: self.employee_code.to_lowercase(),
                direction: self.direction,
                bucket: mobile_bucket(&self.punch_time),
            },
        }
    }
}

/// Identity of a raw punch. Vendor punches are identified by their external id; mobile punches
/// by employee, direction and a coarse time bucket so that client clock skew collapses repeats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub enum DedupKey {
    #[display(fmt = "ext:{}", _0)]
    External(i64),
    #[display(fmt = "mob:{}:{}:{}", employee_code, direction, bucket)]
    Mobile {
        employee_code: String,
        direction: Direction,
        bucket: i64,
    },
}

/// Index of the 5-minute bucket the timestamp falls into, counted from the unix epoch.
pub fn mobile_bucket(ts: &NaiveDateTime) -> i64 {
    let minutes = ts.and_utc().timestamp().div_euclid(60);
    minutes.div_euclid(MOBILE_BUCKET_MINUTES)
}

/// Raw punch row as stored, with its surrogate key. Used by the near-duplicate sweep.
#[derive(Debug, Clone)]
pub struct StoredPunch {
    pub row_id: i64,
    pub event: RawPunchEvent,
}

/// Seconds since midnight, used for timestamp continuity checks.
pub fn seconds_of_day(ts: &NaiveDateTime) -> u32 {
    ts.time().num_seconds_from_midnight()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn mobile_punches_in_same_bucket_share_a_key() {
        let a = RawPunchEvent {
            external_id: None,
            employee_code: "EMP-001".into(),
            punch_time: at(9, 0, 10),
            direction: Direction::In,
            source: IngestSource::Mobile,
            ingested_at: at(9, 0, 10),
        };
        let b = RawPunchEvent {
            punch_time: at(9, 4, 59),
            employee_code: "emp-001".into(),
            ..a.clone()
        };
        assert_eq!(a.dedup_key(), b.dedup_key());

        let c = RawPunchEvent {
            punch_time: at(9, 5, 0),
            ..a.clone()
        };
        assert_ne!(a.dedup_key(), c.dedup_key());
    }

    #[test]
    fn vendor_key_ignores_everything_but_external_id() {
        let a = RawPunchEvent {
            external_id: Some(105),
            employee_code: "EMP-001".into(),
            punch_time: at(9, 0, 0),
            direction: Direction::In,
            source: IngestSource::Poll,
            ingested_at: at(9, 1, 0),
        };
        let b = RawPunchEvent {
            source: IngestSource::Heal,
            ingested_at: at(18, 0, 0),
            ..a.clone()
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key().to_string(), "ext:105");
    }

    #[test]
    fn vendor_state_mapping() {
        assert_eq!(Direction::from_vendor_state("0"), Direction::In);
        assert_eq!(Direction::from_vendor_state("1"), Direction::Out);
        assert_eq!(Direction::from_vendor_state("4"), Direction::Unknown);
    }
}
