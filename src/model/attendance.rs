use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::model::punch::IngestSource;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    /// Checked in, not yet checked out.
    Present,
    Complete,
    /// Check-out without a check-in.
    Incomplete,
    Absent,
    NonBio,
    /// Soft delete; the row stays for audit and is never revived by a punch.
    Deleted,
}

/// Canonical per-(employee, date) projection every punch folds into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    #[schema(value_type = String, format = "date", example = "2026-03-02")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<NaiveDateTime>,
    pub total_hours: f64,
    pub status: AttendanceStatus,
    pub punch_source: Option<IngestSource>,
    pub geo_lat: Option<f64>,
    pub geo_lon: Option<f64>,
    pub forced_checkout_by: Option<String>,
}

impl AttendanceRecord {
    pub fn empty(employee_code: &str, date: NaiveDate) -> Self {
        Self {
            employee_code: employee_code.to_string(),
            date,
            check_in: None,
            check_out: None,
            total_hours: 0.0,
            status: AttendanceStatus::Absent,
            punch_source: None,
            geo_lat: None,
            geo_lon: None,
            forced_checkout_by: None,
        }
    }

    /// Hours between check-in and check-out, 0 unless both are set.
    pub fn worked_hours(&self) -> f64 {
        match (self.check_in, self.check_out) {
            (Some(i), Some(o)) if o >= i => (o - i).num_seconds() as f64 / 3600.0,
            _ => 0.0,
        }
    }

    pub fn has_open_check_in(&self) -> bool {
        self.check_in.is_some() && self.check_out.is_none()
    }
}
