//! Scripted punch source for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::{IntegrityError, Result};
use crate::model::punch::{IngestSource, RawPunchEvent};
use crate::source::PunchSource;

#[derive(Default)]
pub struct ScriptedSource {
    /// Punches the vendor actually holds.
    punches: Mutex<Vec<RawPunchEvent>>,
    /// Number of upcoming calls that fail with a transient error.
    failures: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedSource {
    pub fn new(punches: Vec<RawPunchEvent>) -> Self {
        Self {
            punches: Mutex::new(punches),
            ..Self::default()
        }
    }

    pub fn fail_next(&self, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back("503 Service Unavailable".to_string());
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn next_failure(&self) -> Option<IntegrityError> {
        self.failures
            .lock()
            .unwrap()
            .pop_front()
            .map(IntegrityError::TransientSource)
    }
}

#[async_trait]
impl PunchSource for ScriptedSource {
    async fn fetch_by_time_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RawPunchEvent>> {
        self.calls
            .lock()
            .unwrap()
            .push((start.to_string(), end.to_string()));
        if let Some(e) = self.next_failure() {
            return Err(e);
        }
        Ok(self
            .punches
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.punch_time >= start && p.punch_time <= end)
            .cloned()
            .collect())
    }

    async fn fetch_by_id_range(&self, start_id: i64, end_id: i64) -> Result<Vec<RawPunchEvent>> {
        self.calls
            .lock()
            .unwrap()
            .push((start_id.to_string(), end_id.to_string()));
        if let Some(e) = self.next_failure() {
            return Err(e);
        }
        Ok(self
            .punches
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.external_id.is_some_and(|id| id >= start_id && id <= end_id))
            .cloned()
            .map(|mut p| {
                p.source = IngestSource::Heal;
                p
            })
            .collect())
    }
}
