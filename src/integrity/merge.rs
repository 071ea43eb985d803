//! The single entry point every punch takes into the attendance ledger.
//!
//! Precedence, regardless of source:
//! - check-in keeps the EARLIEST punch of the day
//! - check-out keeps the LATEST punch of the day
//! - an `unknown` direction is treated as check-in when the day has none (or the punch is
//!   earlier than it), otherwise as check-out
//! - if the fold leaves check-out before check-in, the two are swapped
//! - a soft-deleted day is never revived

use chrono::{NaiveDate, NaiveDateTime};

use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::punch::{Direction, IngestSource, RawPunchEvent};
use crate::store::MergeOutcome;

#[derive(Debug, Clone, PartialEq)]
pub struct PunchMerge {
    pub employee_code: String,
    pub date: NaiveDate,
    pub direction: Direction,
    pub timestamp: NaiveDateTime,
    pub source: IngestSource,
    pub geo: Option<(f64, f64)>,
}

impl PunchMerge {
    pub fn from_event(event: &RawPunchEvent) -> Self {
        Self {
            employee_code: event.employee_code.clone(),
            date: event.punch_time.date(),
            direction: event.direction,
            timestamp: event.punch_time,
            source: event.source,
            geo: None,
        }
    }

    pub fn with_geo(mut self, lat: f64, lon: f64) -> Self {
        self.geo = Some((lat, lon));
        self
    }
}

fn resolve_direction(record: &AttendanceRecord, punch: &PunchMerge) -> Direction {
    match punch.direction {
        Direction::Unknown => match record.check_in {
            None => Direction::In,
            Some(check_in) if punch.timestamp < check_in => Direction::In,
            Some(_) => Direction::Out,
        },
        other => other,
    }
}

/// Folds `punch` into `existing` (or a fresh record). Pure; callers hold the row lock.
pub fn apply_punch(existing: Option<AttendanceRecord>, punch: &PunchMerge) -> MergeOutcome {
    let mut record =
        existing.unwrap_or_else(|| AttendanceRecord::empty(&punch.employee_code, punch.date));

    if record.status == AttendanceStatus::Deleted {
        return MergeOutcome {
            record,
            changed: false,
        };
    }

    let before = record.clone();

    match resolve_direction(&record, punch) {
        Direction::In => {
            if record.check_in.is_none_or(|current| punch.timestamp < current) {
                record.check_in = Some(punch.timestamp);
            }
        }
        _ => {
            if record.check_out.is_none_or(|current| punch.timestamp > current) {
                record.check_out = Some(punch.timestamp);
            }
        }
    }

    if let (Some(check_in), Some(check_out)) = (record.check_in, record.check_out) {
        if check_out < check_in {
            record.check_in = Some(check_out);
            record.check_out = Some(check_in);
        }
    }

    let changed = record.check_in != before.check_in || record.check_out != before.check_out;
    if changed {
        record.punch_source = Some(punch.source);
        if let Some((lat, lon)) = punch.geo {
            record.geo_lat = Some(lat);
            record.geo_lon = Some(lon);
        }
    }

    record.total_hours = record.worked_hours();
    if record.status != AttendanceStatus::NonBio {
        record.status = match (record.check_in, record.check_out) {
            (Some(_), Some(_)) => AttendanceStatus::Complete,
            (Some(_), None) => AttendanceStatus::Present,
            (None, Some(_)) => AttendanceStatus::Incomplete,
            (None, None) => AttendanceStatus::Absent,
        };
    }

    MergeOutcome { record, changed }
}
