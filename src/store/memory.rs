//! In-memory ledger used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{IntegrityError, Result};
use crate::integrity::merge::{PunchMerge, apply_punch};
use crate::model::attendance::AttendanceRecord;
use crate::model::consistency::{AttendanceCounts, ConsistencySnapshot};
use crate::model::punch::{DedupKey, Direction, RawPunchEvent, StoredPunch};
use crate::model::validation::{GeofenceViolation, PunchValidationRecord};
use crate::store::{LedgerStore, MergeOutcome};

#[derive(Default)]
struct State {
    raw: Vec<(String, StoredPunch, Option<i64>)>,
    keys: HashSet<String>,
    attendance: HashMap<(String, NaiveDate), AttendanceRecord>,
    employees: Vec<(String, bool)>,
    validations: Vec<PunchValidationRecord>,
    violations: Vec<GeofenceViolation>,
    snapshots: Vec<ConsistencySnapshot>,
    merge_calls: usize,
    record_failures: usize,
    read_failures: usize,
    violation_failures: usize,
}

#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active roster: (employee_code, is_non_bio).
    pub fn with_employees(employees: Vec<(String, bool)>) -> Self {
        let ledger = Self::new();
        ledger.state.lock().unwrap().employees = employees;
        ledger
    }

    pub fn put_attendance(&self, record: AttendanceRecord) {
        self.state
            .lock()
            .unwrap()
            .attendance
            .insert((record.employee_code.clone(), record.date), record);
    }

    pub fn raw_count(&self) -> usize {
        self.state.lock().unwrap().raw.len()
    }

    pub fn raw_events(&self) -> Vec<RawPunchEvent> {
        self.state
            .lock()
            .unwrap()
            .raw
            .iter()
            .map(|(_, p, _)| p.event.clone())
            .collect()
    }

    pub fn merged_rows(&self) -> Vec<(i64, i64)> {
        self.state
            .lock()
            .unwrap()
            .raw
            .iter()
            .filter_map(|(_, p, merged)| merged.map(|m| (p.row_id, m)))
            .collect()
    }

    pub fn attendance_rows(&self) -> Vec<AttendanceRecord> {
        self.state.lock().unwrap().attendance.values().cloned().collect()
    }

    pub fn validations(&self) -> Vec<PunchValidationRecord> {
        self.state.lock().unwrap().validations.clone()
    }

    pub fn violations(&self) -> Vec<GeofenceViolation> {
        self.state.lock().unwrap().violations.clone()
    }

    pub fn snapshots(&self) -> Vec<ConsistencySnapshot> {
        self.state.lock().unwrap().snapshots.clone()
    }

    pub fn merge_calls(&self) -> usize {
        self.state.lock().unwrap().merge_calls
    }

    /// The next `n` punch writes fail without writing anything.
    pub fn fail_next_records(&self, n: usize) {
        self.state.lock().unwrap().record_failures = n;
    }

    /// The next `n` attendance or last-punch reads fail.
    pub fn fail_next_reads(&self, n: usize) {
        self.state.lock().unwrap().read_failures = n;
    }

    pub fn fail_next_violation_inserts(&self, n: usize) {
        self.state.lock().unwrap().violation_failures = n;
    }
}

fn injected(counter: &mut usize) -> Result<()> {
    if *counter > 0 {
        *counter -= 1;
        return Err(IntegrityError::Database(sqlx::Error::PoolTimedOut));
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn punch_key_exists(&self, key: &DedupKey) -> Result<bool> {
        Ok(self.state.lock().unwrap().keys.contains(&key.to_string()))
    }

    async fn record_punch(
        &self,
        key: &DedupKey,
        event: &RawPunchEvent,
        merge: &PunchMerge,
    ) -> Result<Option<MergeOutcome>> {
        let mut state = self.state.lock().unwrap();
        injected(&mut state.record_failures)?;
        let key = key.to_string();
        if state.keys.contains(&key) {
            return Ok(None);
        }

        state.merge_calls += 1;
        let day = (merge.employee_code.clone(), merge.date);
        let outcome = apply_punch(state.attendance.get(&day).cloned(), merge);
        if outcome.changed {
            state.attendance.insert(day, outcome.record.clone());
        }

        let row_id = state.raw.len() as i64 + 1;
        state.keys.insert(key.clone());
        state.raw.push((
            key,
            StoredPunch {
                row_id,
                event: event.clone(),
            },
            None,
        ));
        Ok(Some(outcome))
    }

    async fn attendance_for(
        &self,
        employee_code: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        let mut state = self.state.lock().unwrap();
        injected(&mut state.read_failures)?;
        Ok(state
            .attendance
            .get(&(employee_code.to_string(), date))
            .cloned())
    }

    async fn last_punch_time(
        &self,
        employee_code: &str,
        direction: Direction,
    ) -> Result<Option<NaiveDateTime>> {
        let mut state = self.state.lock().unwrap();
        injected(&mut state.read_failures)?;
        Ok(state
            .raw
            .iter()
            .filter(|(_, p, merged)| {
                merged.is_none()
                    && p.event.employee_code.eq_ignore_ascii_case(employee_code)
                    && p.event.direction == direction
            })
            .map(|(_, p, _)| p.event.punch_time)
            .max())
    }

    async fn vendor_punches_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RawPunchEvent>> {
        let mut events: Vec<RawPunchEvent> = self
            .state
            .lock()
            .unwrap()
            .raw
            .iter()
            .map(|(_, p, _)| p.event.clone())
            .filter(|e| e.external_id.is_some() && e.punch_time >= start && e.punch_time < end)
            .collect();
        events.sort_by_key(|e| e.external_id);
        Ok(events)
    }

    async fn punches_since(&self, since: NaiveDateTime) -> Result<Vec<StoredPunch>> {
        let mut rows: Vec<StoredPunch> = self
            .state
            .lock()
            .unwrap()
            .raw
            .iter()
            .filter(|(_, p, merged)| merged.is_none() && p.event.ingested_at >= since)
            .map(|(_, p, _)| p.clone())
            .collect();
        rows.sort_by_key(|p| (p.event.punch_time, p.row_id));
        Ok(rows)
    }

    async fn mark_merged(&self, merges: &[(i64, i64)]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let mut updated = 0;
        for (row_id, kept) in merges {
            if let Some(row) = state
                .raw
                .iter_mut()
                .find(|(_, p, merged)| p.row_id == *row_id && merged.is_none())
            {
                row.2 = Some(*kept);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn recent_punch_keys(&self, since: NaiveDateTime) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .raw
            .iter()
            .filter(|(_, p, _)| p.event.ingested_at >= since)
            .map(|(k, _, _)| k.clone())
            .collect())
    }

    async fn attendance_counts(&self, date: NaiveDate) -> Result<AttendanceCounts> {
        let state = self.state.lock().unwrap();
        let start = date.and_hms_opt(0, 0, 0).unwrap();
        let end = start + Duration::days(1);
        let attendees: HashSet<String> = state
            .raw
            .iter()
            .filter(|(_, p, _)| p.event.punch_time >= start && p.event.punch_time < end)
            .map(|(_, p, _)| p.event.employee_code.to_lowercase())
            .collect();
        Ok(AttendanceCounts {
            total_active_employees: state.employees.len() as i64,
            unique_attendees: attendees.len() as i64,
            non_bio_exempt: state.employees.iter().filter(|(_, nb)| *nb).count() as i64,
        })
    }

    async fn insert_validation(&self, record: &PunchValidationRecord) -> Result<()> {
        self.state.lock().unwrap().validations.push(record.clone());
        Ok(())
    }

    async fn insert_geofence_violation(&self, violation: &GeofenceViolation) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        injected(&mut state.violation_failures)?;
        state.violations.push(violation.clone());
        Ok(())
    }

    async fn insert_snapshot(&self, snapshot: &ConsistencySnapshot) -> Result<()> {
        self.state.lock().unwrap().snapshots.push(snapshot.clone());
        Ok(())
    }
}
