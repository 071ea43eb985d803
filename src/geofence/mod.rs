//! Geofence learner seam. The learning itself happens elsewhere; this side only resolves the
//! nearest learned cluster and nudges a cluster after an accepted punch.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::geofence::ClusterMatch;
use crate::model::punch::Direction;

pub mod sql;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[async_trait]
pub trait GeofenceLearner: Send + Sync {
    /// Nearest cluster for the employee that applies to this punch type, or `None` when the
    /// employee has no learned location yet.
    async fn resolve_nearest_cluster(
        &self,
        employee_code: &str,
        lat: f64,
        lon: f64,
        punch_type: Direction,
    ) -> Result<Option<ClusterMatch>>;

    /// Fire-and-forget reinforcement after an accepted punch.
    async fn reinforce(&self, cluster_id: i64, lat: f64, lon: f64) -> Result<()>;
}

/// Great-circle distance in meters (haversine).
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
}
