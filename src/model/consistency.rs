use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Raw counts the monitor derives its verdict from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttendanceCounts {
    pub total_active_employees: i64,
    pub unique_attendees: i64,
    pub non_bio_exempt: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConsistencySnapshot {
    #[schema(value_type = String, format = "date-time")]
    pub checked_at: NaiveDateTime,
    pub total_employees: i64,
    pub unique_attendees: i64,
    pub non_bio_exempt: i64,
    /// Percentage; may exceed 100 slightly when exempt employees also punched.
    pub attendance_rate: f64,
    pub is_consistent: bool,
    pub issues: Vec<String>,
    pub consecutive_failures: u32,
}
