use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::model::consistency::ConsistencySnapshot;

/// Faults the engine raises instead of failing its schedulers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum FaultEvent {
    /// Every retry for a poll window failed; the next window's overlap still covers it.
    PollDeferred {
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        attempts: u32,
        error: String,
    },
    /// A heal chunk could not be fetched; it is retried on the next heal cycle.
    HealDeferred {
        date: NaiveDate,
        start_id: i64,
        end_id: i64,
        error: String,
    },
    ConsistencyFailure {
        snapshot: ConsistencySnapshot,
    },
    /// Impossible aggregate state. Never auto-corrected.
    DataIntegrity {
        issue: String,
        checked_at: NaiveDateTime,
    },
    /// No id bound could be inferred for the day; operator-supplied bounds are needed.
    GapRemnant {
        date: NaiveDate,
    },
    GeofenceViolation {
        employee_code: String,
        distance_meters: f64,
    },
}

/// Broadcast channel for fault events. Publishing with no subscribers is not an error.
#[derive(Clone)]
pub struct FaultBus {
    tx: broadcast::Sender<FaultEvent>,
}

impl FaultBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: FaultEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FaultEvent> {
        self.tx.subscribe()
    }
}

impl Default for FaultBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Writes every fault to the log until cancelled.
pub fn spawn_fault_logger(bus: &FaultBus, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => received,
            };
            match event {
                Ok(FaultEvent::DataIntegrity { issue, checked_at }) => {
                    error!(%checked_at, issue = %issue, "Data integrity fault");
                }
                Ok(FaultEvent::GapRemnant { date }) => {
                    warn!(%date, "Gap remnant requires operator-supplied id bounds");
                }
                Ok(event) => {
                    let payload = serde_json::to_string(&event).unwrap_or_default();
                    warn!(fault = %payload, "Integrity fault");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Fault logger lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("Fault logger stopped");
    })
}
