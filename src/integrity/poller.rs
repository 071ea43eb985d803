//! Overlapping-window poller.
//!
//! Every tick fetches `[now - retrieval_minutes, now]`. Because the retrieval window is at
//! least twice the interval, consecutive windows overlap and a punch the vendor publishes
//! late is still picked up by the next tick. After deferred polls the window start is pulled
//! back to `last_successful_end - overlap_minutes` (bounded by `max_catchup_minutes`) so a
//! long outage is covered too. Duplicates from the overlap are absorbed by the preventer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::PollerConfig;
use crate::integrity::events::{FaultBus, FaultEvent};
use crate::integrity::ingest::PunchIngestor;
use crate::integrity::ticker::TickTask;
use crate::model::coverage::PollWindow;
use crate::source::{PunchSource, with_fixed_retry};

pub struct Poller {
    config: PollerConfig,
    source: Arc<dyn PunchSource>,
    ingestor: Arc<PunchIngestor>,
    faults: FaultBus,
    last_window: RwLock<Option<PollWindow>>,
    last_success_end: RwLock<Option<NaiveDateTime>>,
}

impl Poller {
    pub fn new(
        config: PollerConfig,
        source: Arc<dyn PunchSource>,
        ingestor: Arc<PunchIngestor>,
        faults: FaultBus,
    ) -> Self {
        Self {
            config,
            source,
            ingestor,
            faults,
            last_window: RwLock::new(None),
            last_success_end: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub async fn last_window(&self) -> Option<PollWindow> {
        self.last_window.read().await.clone()
    }

    async fn window_start(&self, now: NaiveDateTime) -> NaiveDateTime {
        let regular = now - Duration::minutes(self.config.retrieval_minutes);
        let floor = now - Duration::minutes(self.config.max_catchup_minutes);

        match *self.last_success_end.read().await {
            Some(end) => {
                let catch_up = end - Duration::minutes(self.config.overlap_minutes);
                regular.min(catch_up).max(floor)
            }
            None => regular,
        }
    }

    /// Runs one poll. Never fails: a window whose retries are exhausted is logged, published
    /// as a fault and deferred to the next tick.
    pub async fn poll_once(&self, now: NaiveDateTime) -> PollWindow {
        let window_start = self.window_start(now).await;
        let window_end = now;

        let fetched = with_fixed_retry(
            "Vendor poll",
            self.config.max_retries,
            self.config.retry_delay(),
            || self.source.fetch_by_time_range(window_start, window_end),
        )
        .await;

        let mut window = PollWindow {
            window_start,
            window_end,
            overlap_minutes: self.config.overlap_minutes,
            executed_at: now,
            records_returned: 0,
            records_admitted: 0,
            succeeded: false,
        };

        match fetched {
            Ok(events) => {
                window.records_returned = events.len();
                let mut failed_merges = 0;
                for event in &events {
                    match self.ingestor.ingest(event).await {
                        Ok(outcome) if outcome.is_admitted() => window.records_admitted += 1,
                        Ok(_) => {}
                        Err(e) => {
                            failed_merges += 1;
                            error!(error = %e, external_id = ?event.external_id, "Failed to ingest polled punch");
                        }
                    }
                }
                // a window with failed writes is re-read in full by the next catch-up window
                window.succeeded = failed_merges == 0;
                if window.succeeded {
                    *self.last_success_end.write().await = Some(window_end);
                }
                info!(
                    %window_start,
                    %window_end,
                    returned = window.records_returned,
                    admitted = window.records_admitted,
                    "Poll complete"
                );
            }
            Err((e, attempts)) => {
                error!(
                    error = %e,
                    attempts,
                    %window_start,
                    %window_end,
                    "Poll failed after retries, deferring to next window"
                );
                self.faults.publish(FaultEvent::PollDeferred {
                    window_start,
                    window_end,
                    attempts,
                    error: e.to_string(),
                });
            }
        }

        *self.last_window.write().await = Some(window.clone());
        window
    }
}

#[async_trait]
impl TickTask for Poller {
    fn name(&self) -> &'static str {
        "poller"
    }

    async fn tick(&self) {
        let window = self.poll_once(Local::now().naive_local()).await;
        debug!(succeeded = window.succeeded, "Poll tick finished");
    }
}
