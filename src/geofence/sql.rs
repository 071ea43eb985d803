use std::str::FromStr;

use async_trait::async_trait;
use sqlx::MySqlPool;
use tracing::warn;

use crate::error::Result;
use crate::geofence::{GeofenceLearner, haversine_meters};
use crate::model::geofence::{ClusterMatch, GeofenceCluster, LocationType};
use crate::model::punch::Direction;

/// Reads clusters the learner maintains in `geofence_clusters`.
pub struct SqlGeofenceLearner {
    pool: MySqlPool,
}

impl SqlGeofenceLearner {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// Location type of `cluster` if it can serve a punch of `punch_type`. A cluster must be typed
/// by the learner, and a cluster learned from one punch type only serves that type. An
/// unrecognised direction on the cluster serves neither.
fn applies_to(cluster: &GeofenceCluster, punch_type: Direction) -> Option<LocationType> {
    let location_type = match LocationType::from_str(&cluster.location_type) {
        Ok(LocationType::Unknown) | Err(_) => return None,
        Ok(t) => t,
    };
    match cluster.punch_type.as_deref().map(Direction::from_str) {
        None => Some(location_type),
        Some(Ok(learned)) if learned == punch_type || punch_type == Direction::Unknown => {
            Some(location_type)
        }
        Some(_) => None,
    }
}

/// Nearest applicable cluster by great-circle distance to its center.
pub fn nearest_cluster(
    clusters: &[GeofenceCluster],
    lat: f64,
    lon: f64,
    punch_type: Direction,
) -> Option<ClusterMatch> {
    clusters
        .iter()
        .filter_map(|c| {
            applies_to(c, punch_type).map(|location_type| ClusterMatch {
                cluster_id: c.id,
                location_type,
                distance_meters: haversine_meters(lat, lon, c.center_lat, c.center_lon),
                confidence: c.confidence,
            })
        })
        .min_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters))
}

#[async_trait]
impl GeofenceLearner for SqlGeofenceLearner {
    async fn resolve_nearest_cluster(
        &self,
        employee_code: &str,
        lat: f64,
        lon: f64,
        punch_type: Direction,
    ) -> Result<Option<ClusterMatch>> {
        let clusters = sqlx::query_as::<_, GeofenceCluster>(
            r#"
            SELECT id, employee_code, center_lat, center_lon, radius_meters, location_type,
                   punch_type, confidence
            FROM geofence_clusters
            WHERE employee_code = ? AND is_active = 1
            "#,
        )
        .bind(employee_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(nearest_cluster(&clusters, lat, lon, punch_type))
    }

    async fn reinforce(&self, cluster_id: i64, lat: f64, lon: f64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE geofence_clusters
            SET hit_count = hit_count + 1, last_seen_at = NOW(), last_lat = ?, last_lon = ?
            WHERE id = ?
            "#,
        )
        .bind(lat)
        .bind(lon)
        .bind(cluster_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(cluster_id, "Reinforcement target cluster no longer exists");
        }
        Ok(())
    }
}
