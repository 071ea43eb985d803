//! Ledger store seam.
//!
//! The ledger is the only shared mutable resource. Writers (poller, healer, mobile validator)
//! reach it through [`crate::integrity::ingest::PunchIngestor`]; the gap detector and the
//! consistency monitor only read.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::Result;
use crate::integrity::merge::PunchMerge;
use crate::model::attendance::AttendanceRecord;
use crate::model::consistency::{AttendanceCounts, ConsistencySnapshot};
use crate::model::punch::{DedupKey, Direction, RawPunchEvent, StoredPunch};
use crate::model::validation::{GeofenceViolation, PunchValidationRecord};

pub mod mysql;

#[cfg(test)]
pub mod memory;

/// Result of folding one punch into the per-day record.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub record: AttendanceRecord,
    pub changed: bool,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// True when a raw punch with this identity is already recorded.
    async fn punch_key_exists(&self, key: &DedupKey) -> Result<bool>;

    /// Records the raw punch and folds it into the (employee, date) record as one atomic
    /// write. Returns `None` when the unique key already exists; nothing is written then.
    /// On error neither the raw row nor the merge is kept. Implementations serialize
    /// concurrent merges for the same row.
    async fn record_punch(
        &self,
        key: &DedupKey,
        event: &RawPunchEvent,
        merge: &PunchMerge,
    ) -> Result<Option<MergeOutcome>>;

    async fn attendance_for(
        &self,
        employee_code: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>>;

    /// Latest recorded punch time for the employee and direction, ignoring merged rows.
    async fn last_punch_time(
        &self,
        employee_code: &str,
        direction: Direction,
    ) -> Result<Option<NaiveDateTime>>;

    /// Vendor punches (external id set) with `start <= punch_time < end`, ordered by id.
    async fn vendor_punches_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RawPunchEvent>>;

    /// Unmerged raw punches ingested since `since`, ordered by punch time.
    async fn punches_since(&self, since: NaiveDateTime) -> Result<Vec<StoredPunch>>;

    /// Marks rows as merged into a kept row. Returns the number of rows updated.
    async fn mark_merged(&self, merges: &[(i64, i64)]) -> Result<u64>;

    /// Dedup keys of punches ingested since `since`, for cache warmup.
    async fn recent_punch_keys(&self, since: NaiveDateTime) -> Result<Vec<String>>;

    async fn attendance_counts(&self, date: NaiveDate) -> Result<AttendanceCounts>;

    async fn insert_validation(&self, record: &PunchValidationRecord) -> Result<()>;

    async fn insert_geofence_violation(&self, violation: &GeofenceViolation) -> Result<()>;

    async fn insert_snapshot(&self, snapshot: &ConsistencySnapshot) -> Result<()>;
}
