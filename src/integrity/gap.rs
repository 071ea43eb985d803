//! Per-day coverage analysis over vendor external ids.
//!
//! A day is incomplete when its sorted ids skip a value (`has_id_gap`) or its punches do not
//! reach from 00:01 to 23:59 (`has_timestamp_gap`); the latter catches missing first/last
//! punches that leave no hole between observed ids. Heal ranges are widened to the neighbour
//! days' id bounds when those are known.
//!
//! Known limitation: a day with no punches whose neighbours are also empty has no id bound
//! and stays a remnant until an operator supplies the range.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::Result;
use crate::model::coverage::{DayCoverage, IdGap};
use crate::model::punch::{RawPunchEvent, seconds_of_day};
use crate::store::LedgerStore;

/// 00:01:00
const DAY_START_SECS: u32 = 60;
/// 23:59:00
const DAY_END_SECS: u32 = 23 * 3600 + 59 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct HealTarget {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub start_id: i64,
    pub end_id: i64,
    /// Bound came from a neighbouring day rather than the day's own ids.
    pub inferred: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct HealPlan {
    pub targets: Vec<HealTarget>,
    #[schema(value_type = Vec<String>)]
    pub remnants: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GapSummary {
    #[schema(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to: NaiveDate,
    pub days_analyzed: usize,
    pub incomplete_days: usize,
    pub days_with_id_gaps: usize,
    pub total_missing_ids: i64,
    pub average_completeness: f64,
    #[schema(value_type = Vec<String>)]
    pub remnants: Vec<NaiveDate>,
}

/// Coverage of one day from its vendor punches (any order).
pub fn coverage_for_day(date: NaiveDate, events: &[RawPunchEvent]) -> DayCoverage {
    let mut ids: Vec<i64> = events.iter().filter_map(|e| e.external_id).collect();
    ids.sort_unstable();
    ids.dedup();

    let first_punch = events.iter().map(|e| e.punch_time).min();
    let last_punch = events.iter().map(|e| e.punch_time).max();

    let gaps: Vec<IdGap> = ids
        .windows(2)
        .filter(|w| w[1] - w[0] > 1)
        .map(|w| IdGap {
            after_id: w[0],
            before_id: w[1],
        })
        .collect();

    let has_full_timestamp_continuity = match (first_punch, last_punch) {
        (Some(first), Some(last)) => {
            seconds_of_day(&first) <= DAY_START_SECS && seconds_of_day(&last) >= DAY_END_SECS
        }
        _ => false,
    };

    let (min_id, max_id) = (ids.first().copied(), ids.last().copied());
    let observed_count = ids.len() as i64;
    let expected_count = match (min_id, max_id) {
        (Some(lo), Some(hi)) => hi - lo + 1,
        _ => 0,
    };
    let completeness = if expected_count > 0 {
        (observed_count as f64 / expected_count as f64 * 100.0).min(100.0)
    } else {
        0.0
    };

    DayCoverage {
        date,
        min_id,
        max_id,
        observed_count,
        expected_count,
        has_full_timestamp_continuity,
        gaps,
        first_punch,
        last_punch,
        completeness,
    }
}

/// Builds heal work for every day in `days` (consecutive, ascending). `before` and `after`
/// are the coverages of the days just outside the range, used only as neighbours.
pub fn plan_heals(
    days: &[DayCoverage],
    before: Option<&DayCoverage>,
    after: Option<&DayCoverage>,
) -> HealPlan {
    let mut plan = HealPlan::default();

    for (i, day) in days.iter().enumerate() {
        let prev = if i == 0 { before } else { days.get(i - 1) };
        let next = days.get(i + 1).or(if i + 1 == days.len() { after } else { None });

        let prev_bound = prev.and_then(|d| d.max_id).map(|id| id + 1);
        let next_bound = next.and_then(|d| d.min_id).map(|id| id - 1);

        match (day.min_id, day.max_id) {
            (Some(lo), Some(hi)) => {
                if !day.has_id_gap() && !day.has_timestamp_gap() {
                    continue;
                }
                let (start_id, end_id) = if day.has_timestamp_gap() {
                    (prev_bound.unwrap_or(lo).min(lo), next_bound.unwrap_or(hi).max(hi))
                } else {
                    (lo, hi)
                };
                plan.targets.push(HealTarget {
                    date: day.date,
                    start_id,
                    end_id,
                    inferred: start_id != lo || end_id != hi,
                });
            }
            _ => match (prev_bound, next_bound) {
                (Some(start_id), Some(end_id)) if start_id <= end_id => {
                    plan.targets.push(HealTarget {
                        date: day.date,
                        start_id,
                        end_id,
                        inferred: true,
                    });
                }
                // neighbours are adjacent in id space: the day really had no punches
                (Some(_), Some(_)) => {}
                _ => plan.remnants.push(day.date),
            },
        }
    }

    plan
}

pub struct GapDetector {
    store: Arc<dyn LedgerStore>,
}

impl GapDetector {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn analyze_day(&self, date: NaiveDate) -> Result<DayCoverage> {
        let start = date.and_time(NaiveTime::MIN);
        let events = self
            .store
            .vendor_punches_between(start, start + Duration::days(1))
            .await?;
        Ok(coverage_for_day(date, &events))
    }

    /// Coverage for each day in `from..=to`.
    pub async fn analyze_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DayCoverage>> {
        let mut out = Vec::new();
        let mut date = from;
        while date <= to {
            out.push(self.analyze_day(date).await?);
            date += Duration::days(1);
        }
        Ok(out)
    }

    /// Analyses `from..=to` plus one neighbour day on each side and plans heals for the range.
    pub async fn plan_range(&self, from: NaiveDate, to: NaiveDate) -> Result<HealPlan> {
        let days = self.analyze_range(from, to).await?;
        let before = self.analyze_day(from - Duration::days(1)).await?;
        let after = self.analyze_day(to + Duration::days(1)).await?;
        Ok(plan_heals(&days, Some(&before), Some(&after)))
    }

    pub async fn summary(&self, from: NaiveDate, to: NaiveDate) -> Result<GapSummary> {
        let days = self.analyze_range(from, to).await?;
        let before = self.analyze_day(from - Duration::days(1)).await?;
        let after = self.analyze_day(to + Duration::days(1)).await?;
        let plan = plan_heals(&days, Some(&before), Some(&after));

        let average_completeness = if days.is_empty() {
            0.0
        } else {
            days.iter().map(|d| d.completeness).sum::<f64>() / days.len() as f64
        };

        Ok(GapSummary {
            from,
            to,
            days_analyzed: days.len(),
            incomplete_days: plan.targets.len() + plan.remnants.len(),
            days_with_id_gaps: days.iter().filter(|d| d.has_id_gap()).count(),
            total_missing_ids: days.iter().map(DayCoverage::missing_ids).sum(),
            average_completeness,
            remnants: plan.remnants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::punch::{Direction, IngestSource};
    use chrono::NaiveDateTime;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        d(day).and_hms_opt(h, m, 0).unwrap()
    }

    fn ev(id: i64, t: NaiveDateTime) -> RawPunchEvent {
        RawPunchEvent {
            external_id: Some(id),
            employee_code: format!("EMP-{}", id),
            punch_time: t,
            direction: Direction::Unknown,
            source: IngestSource::Poll,
            ingested_at: t,
        }
    }

    /// ids lo..=hi spread between 00:00 and 23:59 on `day`, minus `skip`
    fn day_events(day: u32, lo: i64, hi: i64, skip: &[i64]) -> Vec<RawPunchEvent> {
        let n = (hi - lo) as u32;
        (lo..=hi)
            .filter(|id| !skip.contains(id))
            .map(|id| {
                let minute = ((id - lo) as u32) * (23 * 60 + 59) / n.max(1);
                ev(id, at(day, minute / 60, minute % 60))
            })
            .collect()
    }

    #[test]
    fn single_missing_id_is_one_gap() {
        let cov = coverage_for_day(d(2), &day_events(2, 100, 110, &[105]));
        assert_eq!(cov.gaps.len(), 1);
        assert_eq!(cov.missing_ids(), 1);
        assert_eq!(cov.observed_count, 10);
        assert_eq!(cov.expected_count, 11);
        assert!((cov.completeness - 90.909).abs() < 0.01);
        assert!(cov.has_full_timestamp_continuity);
    }

    #[test]
    fn continuous_ids_can_still_miss_the_day_edges() {
        let events: Vec<_> = (1..=5).map(|i| ev(i, at(2, 8 + i as u32, 0))).collect();
        let cov = coverage_for_day(d(2), &events);
        assert!(!cov.has_id_gap());
        assert!(cov.has_timestamp_gap());
        assert_eq!(cov.completeness, 100.0);
    }

    #[test]
    fn empty_day_bounds_come_from_neighbours() {
        let prev = coverage_for_day(d(1), &day_events(1, 1, 50, &[]));
        let empty = coverage_for_day(d(2), &[]);
        let next = coverage_for_day(d(3), &day_events(3, 81, 120, &[]));

        let plan = plan_heals(&[empty], Some(&prev), Some(&next));
        assert_eq!(
            plan.targets,
            vec![HealTarget {
                date: d(2),
                start_id: 51,
                end_id: 80,
                inferred: true
            }]
        );
        assert!(plan.remnants.is_empty());
    }

    #[test]
    fn empty_day_between_empty_neighbours_is_a_remnant() {
        let days = vec![
            coverage_for_day(d(1), &[]),
            coverage_for_day(d(2), &[]),
            coverage_for_day(d(3), &day_events(3, 10, 20, &[])),
        ];
        let plan = plan_heals(&days, None, None);
        assert_eq!(plan.remnants, vec![d(1), d(2)]);
        // day 3 spans the whole day with no holes
        assert!(plan.targets.is_empty());
    }

    #[test]
    fn adjacent_neighbours_mean_a_genuinely_empty_day() {
        let prev = coverage_for_day(d(1), &day_events(1, 1, 50, &[]));
        let next = coverage_for_day(d(3), &day_events(3, 51, 90, &[]));
        let plan = plan_heals(&[coverage_for_day(d(2), &[])], Some(&prev), Some(&next));
        assert!(plan.targets.is_empty());
        assert!(plan.remnants.is_empty());
    }

    #[test]
    fn timestamp_gap_widens_range_to_neighbours() {
        let prev = coverage_for_day(d(1), &day_events(1, 1, 99, &[]));
        // the day's first punch (id 100) never arrived; 101..=110 look contiguous
        let day: Vec<_> = (101..=110).map(|i| ev(i, at(2, 9, (i - 100) as u32))).collect();
        let cov = coverage_for_day(d(2), &day);
        assert!(!cov.has_id_gap());
        let plan = plan_heals(&[cov], Some(&prev), None);
        assert_eq!(plan.targets[0].start_id, 100);
        assert_eq!(plan.targets[0].end_id, 110);
        assert!(plan.targets[0].inferred);
    }
}
