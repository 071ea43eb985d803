use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use futures_util::TryStreamExt;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, Row, Transaction};
use tracing::{debug, error};

use crate::error::{IntegrityError, Result};
use crate::integrity::merge::{PunchMerge, apply_punch};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::consistency::{AttendanceCounts, ConsistencySnapshot};
use crate::model::punch::{DedupKey, Direction, IngestSource, RawPunchEvent, StoredPunch};
use crate::model::validation::{GeofenceViolation, PunchValidationRecord};
use crate::store::{LedgerStore, MergeOutcome};

/// MySQL "duplicate entry" SQLSTATE.
const DUPLICATE_KEY: &str = "23000";

#[derive(Clone)]
pub struct MySqlLedger {
    pool: MySqlPool,
}

impl MySqlLedger {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn parse_column<T: FromStr>(row: &MySqlRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|_| {
        IntegrityError::DataIntegrity(format!("unexpected value '{}' in column {}", raw, column))
    })
}

fn raw_event_from_row(row: &MySqlRow) -> Result<RawPunchEvent> {
    Ok(RawPunchEvent {
        external_id: row.try_get("external_id")?,
        employee_code: row.try_get("employee_code")?,
        punch_time: row.try_get("punch_time")?,
        direction: parse_column(row, "direction")?,
        source: parse_column(row, "ingest_source")?,
        ingested_at: row.try_get("ingested_at")?,
    })
}

fn attendance_from_row(row: &MySqlRow) -> Result<AttendanceRecord> {
    let punch_source: Option<String> = row.try_get("punch_source")?;
    Ok(AttendanceRecord {
        employee_code: row.try_get("employee_code")?,
        date: row.try_get("date")?,
        check_in: row.try_get("check_in")?,
        check_out: row.try_get("check_out")?,
        total_hours: row.try_get("total_hours")?,
        status: parse_column::<AttendanceStatus>(row, "status")?,
        punch_source: punch_source.and_then(|s| IngestSource::from_str(&s).ok()),
        geo_lat: row.try_get("geo_lat")?,
        geo_lon: row.try_get("geo_lon")?,
        forced_checkout_by: row.try_get("forced_checkout_by")?,
    })
}

fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(chrono::NaiveTime::MIN);
    (start, start + Duration::days(1))
}

/// JSON text for the list columns of the audit tables.
fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

const ATTENDANCE_COLUMNS: &str = r#"
    employee_code, date, check_in, check_out, total_hours, status,
    punch_source, geo_lat, geo_lon, forced_checkout_by
"#;

/// Folds one punch into its day row under a row lock held by `tx`.
async fn merge_in(tx: &mut Transaction<'_, MySql>, punch: &PunchMerge) -> Result<MergeOutcome> {
    // Make sure the row exists so FOR UPDATE has something to lock.
    sqlx::query(
        r#"
        INSERT IGNORE INTO attendance (employee_code, date, status, total_hours)
        VALUES (?, ?, 'absent', 0)
        "#,
    )
    .bind(&punch.employee_code)
    .bind(punch.date)
    .execute(&mut **tx)
    .await?;

    let row = sqlx::query(&format!(
        "SELECT {} FROM attendance WHERE employee_code = ? AND date = ? FOR UPDATE",
        ATTENDANCE_COLUMNS
    ))
    .bind(&punch.employee_code)
    .bind(punch.date)
    .fetch_one(&mut **tx)
    .await?;

    let existing = attendance_from_row(&row)?;
    let outcome = apply_punch(Some(existing), punch);

    if outcome.changed {
        let r = &outcome.record;
        sqlx::query(
            r#"
            UPDATE attendance
            SET check_in = ?, check_out = ?, total_hours = ?, status = ?,
                punch_source = ?, geo_lat = ?, geo_lon = ?, updated_at = NOW()
            WHERE employee_code = ? AND date = ?
            "#,
        )
        .bind(r.check_in)
        .bind(r.check_out)
        .bind(r.total_hours)
        .bind(r.status.as_ref())
        .bind(r.punch_source.map(|s| s.as_ref().to_string()))
        .bind(r.geo_lat)
        .bind(r.geo_lon)
        .bind(&r.employee_code)
        .bind(r.date)
        .execute(&mut **tx)
        .await?;
    }

    Ok(outcome)
}

#[async_trait]
impl LedgerStore for MySqlLedger {
    async fn punch_key_exists(&self, key: &DedupKey) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM raw_punches WHERE dedup_key = ? LIMIT 1)",
        )
        .bind(key.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    async fn record_punch(
        &self,
        key: &DedupKey,
        event: &RawPunchEvent,
        merge: &PunchMerge,
    ) -> Result<Option<MergeOutcome>> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO raw_punches
            (dedup_key, external_id, employee_code, punch_time, direction, ingest_source, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.to_string())
        .bind(event.external_id)
        .bind(&event.employee_code)
        .bind(event.punch_time)
        .bind(event.direction.as_ref())
        .bind(event.source.as_ref())
        .bind(event.ingested_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            tx.rollback().await?;
            // unique key is the backstop behind the preventer
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().as_deref() == Some(DUPLICATE_KEY) {
                    debug!(dedup_key = %key, "Raw punch already stored");
                    return Ok(None);
                }
            }
            error!(error = %e, dedup_key = %key, "Failed to insert raw punch");
            return Err(e.into());
        }

        // dropping the transaction on any error below rolls the raw row back too
        let outcome = merge_in(&mut tx, merge).await?;
        tx.commit().await?;
        Ok(Some(outcome))
    }

    async fn attendance_for(
        &self,
        employee_code: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM attendance WHERE employee_code = ? AND date = ?",
            ATTENDANCE_COLUMNS
        ))
        .bind(employee_code)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(attendance_from_row).transpose()
    }

    async fn last_punch_time(
        &self,
        employee_code: &str,
        direction: Direction,
    ) -> Result<Option<NaiveDateTime>> {
        let latest = sqlx::query_scalar::<_, Option<NaiveDateTime>>(
            r#"
            SELECT MAX(punch_time)
            FROM raw_punches
            WHERE employee_code = ? AND direction = ? AND merged_into IS NULL
            "#,
        )
        .bind(employee_code)
        .bind(direction.as_ref())
        .fetch_one(&self.pool)
        .await?;
        Ok(latest)
    }

    async fn vendor_punches_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RawPunchEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT external_id, employee_code, punch_time, direction, ingest_source, ingested_at
            FROM raw_punches
            WHERE external_id IS NOT NULL AND punch_time >= ? AND punch_time < ?
            ORDER BY external_id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(raw_event_from_row).collect()
    }

    async fn punches_since(&self, since: NaiveDateTime) -> Result<Vec<StoredPunch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, external_id, employee_code, punch_time, direction, ingest_source, ingested_at
            FROM raw_punches
            WHERE ingested_at >= ? AND merged_into IS NULL
            ORDER BY punch_time, id
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StoredPunch {
                    row_id: row.try_get("id")?,
                    event: raw_event_from_row(row)?,
                })
            })
            .collect()
    }

    async fn mark_merged(&self, merges: &[(i64, i64)]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for (row_id, kept) in merges {
            updated += sqlx::query(
                "UPDATE raw_punches SET merged_into = ? WHERE id = ? AND merged_into IS NULL",
            )
            .bind(kept)
            .bind(row_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn recent_punch_keys(&self, since: NaiveDateTime) -> Result<Vec<String>> {
        let mut stream = sqlx::query_scalar::<_, String>(
            "SELECT dedup_key FROM raw_punches WHERE ingested_at >= ?",
        )
        .bind(since)
        .fetch(&self.pool);

        let mut keys = Vec::new();
        while let Some(key) = stream.try_next().await? {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn attendance_counts(&self, date: NaiveDate) -> Result<AttendanceCounts> {
        let (start, end) = day_bounds(date);

        let total_active_employees = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM employees WHERE status = 'active'",
        )
        .fetch_one(&self.pool)
        .await?;

        // Deliberately not joined against employees: punches from unknown codes must be able
        // to push this above the roster so the monitor can see it.
        let unique_attendees = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT employee_code)
            FROM raw_punches
            WHERE punch_time >= ? AND punch_time < ?
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let non_bio_exempt = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM non_bio_exemptions n
            JOIN employees e ON e.employee_code = n.employee_code
            WHERE e.status = 'active'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AttendanceCounts {
            total_active_employees,
            unique_attendees,
            non_bio_exempt,
        })
    }

    async fn insert_validation(&self, record: &PunchValidationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO punch_validations
            (id, employee_code, lat, lon, accuracy, punch_type, is_valid, requires_approval,
             location_type, distance_meters, matched_cluster_id, confidence,
             reason_codes, violations, warnings, punch_time, evaluated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.employee_code)
        .bind(record.lat)
        .bind(record.lon)
        .bind(record.accuracy)
        .bind(record.punch_type.as_ref())
        .bind(record.is_valid)
        .bind(record.requires_approval)
        .bind(record.location_type.as_ref())
        .bind(record.distance_meters)
        .bind(record.matched_cluster_id)
        .bind(record.confidence)
        .bind(to_json(&record.reason_codes)?)
        .bind(to_json(&record.violations)?)
        .bind(to_json(&record.warnings)?)
        .bind(record.punch_time)
        .bind(record.evaluated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_geofence_violation(&self, violation: &GeofenceViolation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO geofence_violations
            (validation_id, employee_code, lat, lon, distance_meters, cluster_id, punch_type, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(violation.validation_id.to_string())
        .bind(&violation.employee_code)
        .bind(violation.lat)
        .bind(violation.lon)
        .bind(violation.distance_meters)
        .bind(violation.cluster_id)
        .bind(violation.punch_type.as_ref())
        .bind(violation.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_snapshot(&self, snapshot: &ConsistencySnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consistency_snapshots
            (checked_at, total_employees, unique_attendees, non_bio_exempt,
             attendance_rate, is_consistent, issues, consecutive_failures)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.checked_at)
        .bind(snapshot.total_employees)
        .bind(snapshot.unique_attendees)
        .bind(snapshot.non_bio_exempt)
        .bind(snapshot.attendance_rate)
        .bind(snapshot.is_consistent)
        .bind(to_json(&snapshot.issues)?)
        .bind(snapshot.consecutive_failures)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::model::validation::ReasonCode;

    #[test]
    fn audit_lists_serialize_as_json_arrays() {
        let codes = vec![ReasonCode::OutsideGeofence, ReasonCode::GeofenceViolation];
        let text = to_json(&codes).unwrap();
        assert!(text.starts_with('[') && text.ends_with(']'));
        assert!(text.contains("outside_geofence"), "{}", text);
    }

    #[test]
    fn unserializable_value_is_an_error_not_an_empty_list() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not valid JSON object keys");
        let err = to_json(&bad).unwrap_err();
        assert!(matches!(err, IntegrityError::Serialization(_)));
    }
}
