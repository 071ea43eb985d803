use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LocationType {
    Home,
    Office,
    FieldSite,
    /// No learned cluster; a valid outcome, not a rejection.
    Unknown,
}

/// Learned location owned by the geofence learner. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GeofenceCluster {
    pub id: i64,
    pub employee_code: String,
    pub center_lat: f64,
    pub center_lon: f64,
    /// Extent the learner observed. Acceptance uses the configured geofence radius instead.
    pub radius_meters: f64,
    pub location_type: String,
    /// Punch type the cluster was learned from; `None` serves both.
    pub punch_type: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterMatch {
    pub cluster_id: i64,
    pub location_type: LocationType,
    pub distance_meters: f64,
    pub confidence: f64,
}
