use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One executed poll. Kept in memory only, to size the next window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PollWindow {
    #[schema(value_type = String, format = "date-time")]
    pub window_start: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub window_end: NaiveDateTime,
    pub overlap_minutes: i64,
    #[schema(value_type = String, format = "date-time")]
    pub executed_at: NaiveDateTime,
    pub records_returned: usize,
    pub records_admitted: usize,
    /// False when every retry failed and the window was deferred.
    pub succeeded: bool,
}

/// Run of missing external ids between two observed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IdGap {
    pub after_id: i64,
    pub before_id: i64,
}

impl IdGap {
    pub fn missing(&self) -> i64 {
        self.before_id - self.after_id - 1
    }
}

/// Derived per-day coverage. Recomputed on every scan, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DayCoverage {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub min_id: Option<i64>,
    pub max_id: Option<i64>,
    pub observed_count: i64,
    pub expected_count: i64,
    pub has_full_timestamp_continuity: bool,
    pub gaps: Vec<IdGap>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub first_punch: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_punch: Option<NaiveDateTime>,
    pub completeness: f64,
}

impl DayCoverage {
    pub fn has_id_gap(&self) -> bool {
        !self.gaps.is_empty()
    }

    pub fn has_timestamp_gap(&self) -> bool {
        !self.has_full_timestamp_continuity
    }

    pub fn missing_ids(&self) -> i64 {
        self.gaps.iter().map(IdGap::missing).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.observed_count == 0
    }
}
