use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::config::HealerConfig;
use crate::error::Result;
use crate::integrity::events::{FaultBus, FaultEvent};
use crate::integrity::gap::{GapDetector, HealPlan, HealTarget};
use crate::integrity::ingest::PunchIngestor;
use crate::integrity::ticker::TickTask;
use crate::model::punch::IngestSource;
use crate::source::{PunchSource, with_fixed_retry};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DayHealResult {
    pub target: HealTarget,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub fetched: usize,
    /// Fetched punches that belong to another day (an id range can straddle midnight).
    pub outside_day: usize,
    pub written: usize,
    pub duplicates: usize,
    /// Punches the ledger failed to record; the next heal cycle plans them again.
    pub failed_writes: usize,
    pub completeness_before: f64,
    pub completeness_after: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct HealReport {
    pub days: Vec<DayHealResult>,
    #[schema(value_type = Vec<String>)]
    pub remnants: Vec<NaiveDate>,
}

impl HealReport {
    pub fn written(&self) -> usize {
        self.days.iter().map(|d| d.written).sum()
    }
}

pub struct TargetedHealer {
    config: HealerConfig,
    source: Arc<dyn PunchSource>,
    ingestor: Arc<PunchIngestor>,
    detector: Arc<GapDetector>,
    faults: FaultBus,
}

impl TargetedHealer {
    pub fn new(
        config: HealerConfig,
        source: Arc<dyn PunchSource>,
        ingestor: Arc<PunchIngestor>,
        detector: Arc<GapDetector>,
        faults: FaultBus,
    ) -> Self {
        Self {
            config,
            source,
            ingestor,
            detector,
            faults,
        }
    }

    /// Re-fetches the target's id range in chunks and merges whatever belongs to the day.
    pub async fn heal_target(&self, target: HealTarget) -> Result<DayHealResult> {
        let before = self.detector.analyze_day(target.date).await?;
        let mut result = DayHealResult {
            target,
            chunks: 0,
            failed_chunks: 0,
            fetched: 0,
            outside_day: 0,
            written: 0,
            duplicates: 0,
            failed_writes: 0,
            completeness_before: before.completeness,
            completeness_after: before.completeness,
        };

        let chunk = self.config.chunk_size.max(1);
        let mut chunk_start = target.start_id;
        while chunk_start <= target.end_id {
            let chunk_end = (chunk_start + chunk - 1).min(target.end_id);
            result.chunks += 1;

            let fetched = with_fixed_retry(
                "Heal fetch",
                self.config.max_retries,
                std::time::Duration::from_millis(self.config.retry_delay_ms),
                || self.source.fetch_by_id_range(chunk_start, chunk_end),
            )
            .await;

            match fetched {
                Ok(events) => {
                    result.fetched += events.len();
                    for mut event in events {
                        if event.punch_time.date() != target.date {
                            result.outside_day += 1;
                            continue;
                        }
                        event.source = IngestSource::Heal;
                        match self.ingestor.ingest(&event).await {
                            Ok(outcome) if outcome.is_admitted() => result.written += 1,
                            Ok(_) => result.duplicates += 1,
                            Err(e) => {
                                result.failed_writes += 1;
                                error!(
                                    error = %e,
                                    date = %target.date,
                                    external_id = ?event.external_id,
                                    "Failed to ingest healed punch"
                                );
                            }
                        }
                    }
                }
                Err((e, attempts)) => {
                    result.failed_chunks += 1;
                    warn!(
                        error = %e,
                        attempts,
                        date = %target.date,
                        chunk_start,
                        chunk_end,
                        "Heal chunk deferred"
                    );
                    self.faults.publish(FaultEvent::HealDeferred {
                        date: target.date,
                        start_id: chunk_start,
                        end_id: chunk_end,
                        error: e.to_string(),
                    });
                }
            }

            chunk_start = chunk_end + 1;
        }

        if result.written > 0 {
            result.completeness_after = self.detector.analyze_day(target.date).await?.completeness;
        }

        info!(
            date = %target.date,
            start_id = target.start_id,
            end_id = target.end_id,
            written = result.written,
            failed_writes = result.failed_writes,
            before = result.completeness_before,
            after = result.completeness_after,
            "Heal target processed"
        );
        Ok(result)
    }

    async fn execute(&self, plan: HealPlan) -> Result<HealReport> {
        let mut report = HealReport {
            days: Vec::with_capacity(plan.targets.len()),
            remnants: plan.remnants,
        };

        for target in plan.targets {
            match self.heal_target(target).await {
                Ok(day) => report.days.push(day),
                Err(e) => {
                    error!(error = %e, date = %target.date, "Heal target failed");
                    self.faults.publish(FaultEvent::HealDeferred {
                        date: target.date,
                        start_id: target.start_id,
                        end_id: target.end_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        for date in &report.remnants {
            warn!(%date, "Day has no inferable id bound, left unresolved");
            self.faults.publish(FaultEvent::GapRemnant { date: *date });
        }

        Ok(report)
    }

    /// Operator entry point: plan and heal the given days.
    pub async fn heal_dates(&self, dates: &[NaiveDate]) -> Result<HealReport> {
        let mut report = HealReport::default();
        for date in dates {
            let plan = self.detector.plan_range(*date, *date).await?;
            let day_report = self.execute(plan).await?;
            report.days.extend(day_report.days);
            report.remnants.extend(day_report.remnants);
        }
        Ok(report)
    }

    /// Heals `from..=to` as one range, so days inside it serve as each other's neighbours.
    pub async fn heal_range(&self, from: NaiveDate, to: NaiveDate) -> Result<HealReport> {
        let plan = self.detector.plan_range(from, to).await?;
        self.execute(plan).await
    }

    /// Operator-supplied bounds for a day the detector could not resolve.
    pub async fn heal_id_range(
        &self,
        date: NaiveDate,
        start_id: i64,
        end_id: i64,
    ) -> Result<DayHealResult> {
        if start_id > end_id {
            return Err(crate::error::IntegrityError::InvalidInput(format!(
                "start_id {} is greater than end_id {}",
                start_id, end_id
            )));
        }
        self.heal_target(HealTarget {
            date,
            start_id,
            end_id,
            inferred: false,
        })
        .await
    }
}

#[async_trait]
impl TickTask for TargetedHealer {
    fn name(&self) -> &'static str {
        "gap-healer"
    }

    async fn tick(&self) {
        let today = Local::now().date_naive();
        let from = today - Duration::days(self.config.lookback_days.max(0));
        match self.heal_range(from, today).await {
            Ok(report) => info!(
                days = report.days.len(),
                written = report.written(),
                remnants = report.remnants.len(),
                "Heal cycle complete"
            ),
            Err(e) => error!(error = %e, "Heal cycle failed"),
        }
    }
}
