use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::geofence::LocationType;
use crate::model::punch::Direction;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReasonCode {
    MissingCoordinates,
    InvalidCoordinates,
    InvalidPunchType,
    LowAccuracy,
    UnknownLocation,
    OutsideGeofence,
    GeofenceViolation,
    FutureTimestamp,
    StaleTimestamp,
    RequiresApproval,
    MaxDailyHoursExceeded,
    OvertimeExceeded,
    OpenCheckInExists,
    DayAlreadyComplete,
    NoOpenCheckIn,
    DayDeleted,
    CheckOutBeforeCheckIn,
    DuplicatePunch,
    CommitFailed,
    LedgerUnavailable,
}

/// Append-only audit of one mobile punch evaluation, accepted or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunchValidationRecord {
    pub id: Uuid,
    pub employee_code: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub accuracy: Option<f64>,
    pub punch_type: Direction,
    pub is_valid: bool,
    pub requires_approval: bool,
    pub location_type: LocationType,
    pub distance_meters: Option<f64>,
    pub matched_cluster_id: Option<i64>,
    pub confidence: Option<f64>,
    pub reason_codes: Vec<ReasonCode>,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    pub punch_time: NaiveDateTime,
    pub evaluated_at: NaiveDateTime,
}

/// Written whenever a punch lands far outside every learned cluster, regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceViolation {
    pub validation_id: Uuid,
    pub employee_code: String,
    pub lat: f64,
    pub lon: f64,
    pub distance_meters: f64,
    pub cluster_id: Option<i64>,
    pub punch_type: Direction,
    pub recorded_at: NaiveDateTime,
}
