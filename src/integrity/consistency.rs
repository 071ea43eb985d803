//! Consistency monitor.
//!
//! The vendor API can go quiet without returning an error, so the only reliable signal of a
//! dead pipeline is the aggregate: how many active employees have punched today. The monitor
//! never writes to the ledger; it only records snapshots and publishes faults.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::ConsistencyConfig;
use crate::error::Result;
use crate::integrity::events::{FaultBus, FaultEvent};
use crate::integrity::ticker::TickTask;
use crate::model::consistency::{AttendanceCounts, ConsistencySnapshot};
use crate::store::LedgerStore;

pub const NO_ATTENDANCE_ISSUE: &str = "No attendance data found - potential sync failure";

/// Verdict for one set of counts. Returns (attendance_rate, issues, integrity_faults).
/// `integrity_faults` is the subset of issues describing impossible states.
pub fn evaluate(
    counts: &AttendanceCounts,
    min_attendance_rate: f64,
) -> (f64, Vec<String>, Vec<String>) {
    let total_attendance = counts.unique_attendees + counts.non_bio_exempt;
    let rate = if counts.total_active_employees > 0 {
        total_attendance as f64 / counts.total_active_employees as f64 * 100.0
    } else {
        0.0
    };

    let mut issues = Vec::new();
    let mut faults = Vec::new();

    if counts.total_active_employees == 0 {
        let issue = "No active employees found".to_string();
        faults.push(issue.clone());
        issues.push(issue);
    }
    if counts.unique_attendees == 0 && counts.non_bio_exempt == 0 {
        issues.push(NO_ATTENDANCE_ISSUE.to_string());
    }
    if counts.unique_attendees > counts.total_active_employees {
        let issue = format!(
            "Unique attendees ({}) exceed active employees ({})",
            counts.unique_attendees, counts.total_active_employees
        );
        faults.push(issue.clone());
        issues.push(issue);
    }
    if counts.total_active_employees > 0 && rate < min_attendance_rate {
        issues.push(format!(
            "Low attendance rate: {:.1}% (threshold {:.1}%)",
            rate, min_attendance_rate
        ));
    }

    (rate, issues, faults)
}

#[derive(Default)]
struct MonitorState {
    latest: Option<ConsistencySnapshot>,
    consecutive_failures: u32,
}

pub struct ConsistencyMonitor {
    config: ConsistencyConfig,
    store: Arc<dyn LedgerStore>,
    faults: FaultBus,
    state: RwLock<MonitorState>,
}

impl ConsistencyMonitor {
    pub fn new(config: ConsistencyConfig, store: Arc<dyn LedgerStore>, faults: FaultBus) -> Self {
        Self {
            config,
            store,
            faults,
            state: RwLock::new(MonitorState::default()),
        }
    }

    pub async fn latest(&self) -> Option<ConsistencySnapshot> {
        self.state.read().await.latest.clone()
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.state.read().await.consecutive_failures
    }

    /// Recomputes today's metrics, records a snapshot and publishes faults.
    pub async fn check(&self, now: NaiveDateTime) -> Result<ConsistencySnapshot> {
        let counts = self.store.attendance_counts(now.date()).await?;
        let (attendance_rate, issues, integrity_faults) =
            evaluate(&counts, self.config.min_attendance_rate);
        let is_consistent = issues.is_empty();

        let snapshot = {
            let mut state = self.state.write().await;
            state.consecutive_failures = if is_consistent {
                0
            } else {
                state.consecutive_failures + 1
            };

            let snapshot = ConsistencySnapshot {
                checked_at: now,
                total_employees: counts.total_active_employees,
                unique_attendees: counts.unique_attendees,
                non_bio_exempt: counts.non_bio_exempt,
                attendance_rate,
                is_consistent,
                issues,
                consecutive_failures: state.consecutive_failures,
            };
            state.latest = Some(snapshot.clone());
            snapshot
        };

        if let Err(e) = self.store.insert_snapshot(&snapshot).await {
            // the in-memory verdict still stands and is served to callers
            error!(error = %e, "Failed to persist consistency snapshot");
        }

        for issue in integrity_faults {
            self.faults.publish(FaultEvent::DataIntegrity {
                issue,
                checked_at: now,
            });
        }

        if is_consistent {
            info!(
                rate = snapshot.attendance_rate,
                attendees = snapshot.unique_attendees,
                "Consistency check passed"
            );
        } else {
            if snapshot.consecutive_failures >= self.config.alert_after_failures {
                error!(
                    failures = snapshot.consecutive_failures,
                    issues = ?snapshot.issues,
                    "Consistency check failing repeatedly"
                );
            } else {
                warn!(issues = ?snapshot.issues, "Consistency check failed");
            }
            self.faults.publish(FaultEvent::ConsistencyFailure {
                snapshot: snapshot.clone(),
            });
        }

        Ok(snapshot)
    }

    /// Latest snapshot, running a check first if none exists yet.
    pub async fn status(&self, now: NaiveDateTime) -> Result<ConsistencySnapshot> {
        match self.latest().await {
            Some(snapshot) => Ok(snapshot),
            None => self.check(now).await,
        }
    }
}

#[async_trait]
impl TickTask for ConsistencyMonitor {
    fn name(&self) -> &'static str {
        "consistency-monitor"
    }

    async fn tick(&self) {
        if let Err(e) = self.check(Local::now().naive_local()).await {
            error!(error = %e, "Consistency check could not run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::merge::PunchMerge;
    use crate::model::punch::{Direction, IngestSource, RawPunchEvent};
    use crate::store::memory::InMemoryLedger;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn roster(n: usize, non_bio: usize) -> Vec<(String, bool)> {
        (0..n)
            .map(|i| (format!("EMP-{:03}", i), i < non_bio))
            .collect()
    }

    async fn punch(store: &InMemoryLedger, id: i64, code: &str) {
        let event = RawPunchEvent {
            external_id: Some(id),
            employee_code: code.into(),
            punch_time: noon() - chrono::Duration::hours(3),
            direction: Direction::In,
            source: IngestSource::Poll,
            ingested_at: noon(),
        };
        store
            .record_punch(&event.dedup_key(), &event, &PunchMerge::from_event(&event))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn zero_punches_is_a_sync_failure() {
        let store = Arc::new(InMemoryLedger::with_employees(roster(300, 0)));
        let monitor = ConsistencyMonitor::new(
            ConsistencyConfig::default(),
            store.clone(),
            FaultBus::default(),
        );

        let snapshot = monitor.check(noon()).await.unwrap();
        assert!(!snapshot.is_consistent);
        assert!(snapshot.issues.iter().any(|i| i == NO_ATTENDANCE_ISSUE));
        assert_eq!(snapshot.total_employees, 300);
        assert_eq!(snapshot.attendance_rate, 0.0);
        assert_eq!(store.snapshots().len(), 1);
    }

    #[tokio::test]
    async fn failure_counter_resets_on_pass() {
        let store = Arc::new(InMemoryLedger::with_employees(roster(5, 1)));
        let monitor =
            ConsistencyMonitor::new(ConsistencyConfig::default(), store.clone(), FaultBus::default());

        punch(&store, 1, "EMP-001").await;
        assert!(!monitor.check(noon()).await.unwrap().is_consistent); // 40%
        punch(&store, 2, "EMP-002").await;
        let second = monitor.check(noon()).await.unwrap(); // 60%
        assert_eq!(second.consecutive_failures, 2);

        punch(&store, 3, "EMP-003").await;
        let third = monitor.check(noon()).await.unwrap(); // 80%, threshold is inclusive
        assert!(third.is_consistent, "{:?}", third.issues);
        assert_eq!(third.consecutive_failures, 0);
        assert_eq!(monitor.consecutive_failures().await, 0);
    }

    #[tokio::test]
    async fn impossible_states_raise_integrity_faults() {
        let store = Arc::new(InMemoryLedger::with_employees(roster(1, 0)));
        let faults = FaultBus::default();
        let mut rx = faults.subscribe();
        let monitor = ConsistencyMonitor::new(ConsistencyConfig::default(), store.clone(), faults);

        punch(&store, 1, "EMP-000").await;
        punch(&store, 2, "GHOST-1").await;
        let snapshot = monitor.check(noon()).await.unwrap();
        assert!(!snapshot.is_consistent);

        assert!(matches!(rx.try_recv(), Ok(FaultEvent::DataIntegrity { .. })));
        assert!(matches!(
            rx.try_recv(),
            Ok(FaultEvent::ConsistencyFailure { .. })
        ));
    }

    #[test]
    fn rate_is_deterministic_and_bounded() {
        let counts = AttendanceCounts {
            total_active_employees: 300,
            unique_attendees: 250,
            non_bio_exempt: 40,
        };
        let (a, _, _) = evaluate(&counts, 80.0);
        let (b, _, _) = evaluate(&counts, 80.0);
        assert_eq!(a, b);
        assert!((a - 96.666).abs() < 0.01);

        let empty = AttendanceCounts::default();
        let (rate, issues, faults) = evaluate(&empty, 80.0);
        assert_eq!(rate, 0.0);
        assert_eq!(faults, vec!["No active employees found".to_string()]);
        assert!(issues.iter().any(|i| i == NO_ATTENDANCE_ISSUE));
    }
}
