//! Mobile punch validator.
//!
//! Every submission is evaluated in full so the audit record carries every reason at once,
//! then accepted punches are committed through the shared ingest path before the response is
//! returned. The audit write is never skipped.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ValidatorConfig;
use crate::error::{IntegrityError, Result};
use crate::geofence::GeofenceLearner;
use crate::integrity::events::{FaultBus, FaultEvent};
use crate::integrity::ingest::{IngestOutcome, PunchIngestor};
use crate::integrity::merge::PunchMerge;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::geofence::{ClusterMatch, LocationType};
use crate::model::punch::{Direction, IngestSource, RawPunchEvent};
use crate::model::validation::{GeofenceViolation, PunchValidationRecord, ReasonCode};
use crate::store::LedgerStore;

/// A GPS punch as submitted by the mobile client, with the authenticated employee code.
#[derive(Debug, Clone, PartialEq)]
pub struct MobilePunchRequest {
    pub employee_code: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub punch_type: Direction,
    pub timestamp: NaiveDateTime,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MobilePunchResponse {
    pub is_valid: bool,
    pub can_punch: bool,
    pub location_type: LocationType,
    pub distance: Option<f64>,
    pub confidence: Option<f64>,
    /// Reasons the punch was rejected, to be shown to the employee verbatim.
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    pub requires_approval: bool,
    #[schema(value_type = String, format = "uuid")]
    pub validation_id: Uuid,
}

/// Accumulated verdict for one submission.
#[derive(Debug, Default)]
struct Verdict {
    violations: Vec<String>,
    warnings: Vec<String>,
    reasons: Vec<ReasonCode>,
    requires_approval: bool,
    location_type: Option<LocationType>,
    matched: Option<ClusterMatch>,
}

impl Verdict {
    fn reject(&mut self, reason: ReasonCode, message: impl Into<String>) {
        self.reasons.push(reason);
        self.violations.push(message.into());
    }

    fn warn(&mut self, reason: ReasonCode, message: impl Into<String>) {
        self.reasons.push(reason);
        self.warnings.push(message.into());
    }

    fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

fn coordinates_in_range(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}

pub struct MobilePunchValidator {
    config: ValidatorConfig,
    store: Arc<dyn LedgerStore>,
    ingestor: Arc<PunchIngestor>,
    learner: Arc<dyn GeofenceLearner>,
    faults: FaultBus,
}

impl MobilePunchValidator {
    pub fn new(
        config: ValidatorConfig,
        store: Arc<dyn LedgerStore>,
        ingestor: Arc<PunchIngestor>,
        learner: Arc<dyn GeofenceLearner>,
        faults: FaultBus,
    ) -> Self {
        Self {
            config,
            store,
            ingestor,
            learner,
            faults,
        }
    }

    fn check_coordinates(&self, req: &MobilePunchRequest, verdict: &mut Verdict) -> Option<(f64, f64)> {
        let (lat, lon) = match (req.lat, req.lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                verdict.reject(ReasonCode::MissingCoordinates, "GPS coordinates required");
                return None;
            }
        };

        if !coordinates_in_range(lat, lon) {
            verdict.reject(ReasonCode::InvalidCoordinates, "Invalid GPS coordinates");
            return None;
        }

        match req.accuracy {
            Some(accuracy) if accuracy > self.config.max_accuracy_meters => verdict.reject(
                ReasonCode::LowAccuracy,
                format!(
                    "GPS accuracy too low ({:.0}m, maximum {:.0}m)",
                    accuracy, self.config.max_accuracy_meters
                ),
            ),
            Some(_) => {}
            None => verdict.warnings.push("GPS accuracy not reported".to_string()),
        }

        Some((lat, lon))
    }

    async fn check_geofence(
        &self,
        req: &MobilePunchRequest,
        lat: f64,
        lon: f64,
        verdict: &mut Verdict,
    ) {
        let nearest = match self
            .learner
            .resolve_nearest_cluster(&req.employee_code, lat, lon, req.punch_type)
            .await
        {
            Ok(nearest) => nearest,
            Err(e) => {
                error!(error = %e, employee_code = %req.employee_code, "Geofence lookup failed");
                verdict.reject(ReasonCode::UnknownLocation, "Location could not be verified");
                return;
            }
        };

        let Some(m) = nearest else {
            verdict.location_type = Some(LocationType::Unknown);
            verdict.warn(
                ReasonCode::UnknownLocation,
                "No known location for this employee yet; punch recorded from an unknown location",
            );
            return;
        };

        if m.distance_meters <= self.config.geofence_radius_meters {
            verdict.location_type = Some(m.location_type);
        } else {
            verdict.location_type = Some(LocationType::Unknown);
            verdict.reject(
                ReasonCode::OutsideGeofence,
                format!(
                    "Outside allowed area: {:.0}m from nearest {} location (limit {:.0}m)",
                    m.distance_meters, m.location_type, self.config.geofence_radius_meters
                ),
            );
            if m.distance_meters > self.config.violation_audit_meters {
                verdict.reasons.push(ReasonCode::GeofenceViolation);
            }
        }
        verdict.matched = Some(m);
    }

    fn check_timing(&self, req: &MobilePunchRequest, now: NaiveDateTime, verdict: &mut Verdict) {
        if req.timestamp > now + Duration::seconds(self.config.future_tolerance_secs) {
            verdict.reject(ReasonCode::FutureTimestamp, "Punch time is in the future");
            return;
        }

        let age = now - req.timestamp;
        if age > Duration::hours(self.config.max_age_hours) {
            verdict.reject(
                ReasonCode::StaleTimestamp,
                format!("Punch is older than {} hours", self.config.max_age_hours),
            );
        } else if age > Duration::hours(self.config.approval_age_hours) {
            verdict.requires_approval = true;
            verdict.warn(
                ReasonCode::RequiresApproval,
                format!(
                    "Punch submitted more than {} hours late; requires approval",
                    self.config.approval_age_hours
                ),
            );
        }
    }

    fn check_overbilling(
        &self,
        req: &MobilePunchRequest,
        today: Option<&AttendanceRecord>,
        verdict: &mut Verdict,
    ) {
        if today.is_some_and(|r| r.status == AttendanceStatus::Deleted) {
            verdict.reject(
                ReasonCode::DayDeleted,
                "Attendance for this day was removed and cannot be punched",
            );
            return;
        }

        match req.punch_type {
            Direction::In => {
                let Some(record) = today else { return };
                if record.has_open_check_in() {
                    verdict.reject(
                        ReasonCode::OpenCheckInExists,
                        "Already checked in today; check out first",
                    );
                } else if record.status == AttendanceStatus::Complete {
                    verdict.reject(
                        ReasonCode::DayAlreadyComplete,
                        "Attendance for this day is already complete",
                    );
                }
            }
            Direction::Out => {
                let Some(check_in) = today.and_then(|r| r.check_in) else {
                    verdict.reject(ReasonCode::NoOpenCheckIn, "No check-in found for this day");
                    return;
                };
                if req.timestamp < check_in {
                    verdict.reject(
                        ReasonCode::CheckOutBeforeCheckIn,
                        "Check-out time is before check-in",
                    );
                    return;
                }

                let worked = hours_between(check_in, req.timestamp);
                let overtime_cap = self.config.standard_day_hours + self.config.max_overtime_hours;
                if worked > self.config.max_daily_hours {
                    verdict.reject(
                        ReasonCode::MaxDailyHoursExceeded,
                        format!("Maximum {} hours per day exceeded", self.config.max_daily_hours),
                    );
                } else if worked > overtime_cap {
                    verdict.requires_approval = true;
                    verdict.warn(
                        ReasonCode::OvertimeExceeded,
                        format!(
                            "{:.1} hours worked exceeds the {} hour day by more than {} hours",
                            worked, self.config.standard_day_hours, self.config.max_overtime_hours
                        ),
                    );
                }
            }
            Direction::Unknown => verdict.reject(
                ReasonCode::InvalidPunchType,
                "Punch type must be check-in or check-out",
            ),
        }
    }

    async fn check_duplicate(&self, req: &MobilePunchRequest, verdict: &mut Verdict) -> Result<()> {
        if req.punch_type == Direction::Unknown {
            return Ok(());
        }
        let last = self
            .store
            .last_punch_time(&req.employee_code, req.punch_type)
            .await?;
        if let Some(last) = last {
            let window = Duration::minutes(self.config.duplicate_window_minutes);
            if (req.timestamp - last).abs() < window {
                verdict.reject(
                    ReasonCode::DuplicatePunch,
                    format!(
                        "Duplicate punch within {} minutes",
                        self.config.duplicate_window_minutes
                    ),
                );
            }
        }
        Ok(())
    }

    fn ledger_unavailable(
        &self,
        req: &MobilePunchRequest,
        e: &IntegrityError,
        verdict: &mut Verdict,
    ) {
        error!(error = %e, employee_code = %req.employee_code, "Attendance ledger read failed");
        if !verdict.reasons.contains(&ReasonCode::LedgerUnavailable) {
            verdict.reject(
                ReasonCode::LedgerUnavailable,
                "Attendance could not be checked, please try again later",
            );
        }
    }

    async fn commit(
        &self,
        req: &MobilePunchRequest,
        lat: f64,
        lon: f64,
        now: NaiveDateTime,
        verdict: &mut Verdict,
    ) {
        let event = RawPunchEvent {
            external_id: None,
            employee_code: req.employee_code.clone(),
            punch_time: req.timestamp,
            direction: req.punch_type,
            source: IngestSource::Mobile,
            ingested_at: now,
        };
        let merge = PunchMerge::from_event(&event).with_geo(lat, lon);

        match self.ingestor.ingest_merge(&event, merge).await {
            Ok(IngestOutcome::Merged { .. }) => {}
            Ok(IngestOutcome::Duplicate(_)) => verdict.reject(
                ReasonCode::DuplicatePunch,
                format!(
                    "Duplicate punch within {} minutes",
                    self.config.duplicate_window_minutes
                ),
            ),
            Err(e) => {
                error!(error = %e, employee_code = %req.employee_code, "Failed to commit mobile punch");
                verdict.reject(
                    ReasonCode::CommitFailed,
                    "Punch could not be recorded, please try again later",
                );
            }
        }
    }

    /// Evaluates a submission, commits it when valid and always writes the audit record.
    pub async fn submit(
        &self,
        req: MobilePunchRequest,
        now: NaiveDateTime,
    ) -> Result<MobilePunchResponse> {
        let mut verdict = Verdict::default();

        let coords = self.check_coordinates(&req, &mut verdict);
        if let Some((lat, lon)) = coords {
            self.check_geofence(&req, lat, lon, &mut verdict).await;
        }
        self.check_timing(&req, now, &mut verdict);

        match self
            .store
            .attendance_for(&req.employee_code, req.timestamp.date())
            .await
        {
            Ok(today) => self.check_overbilling(&req, today.as_ref(), &mut verdict),
            Err(e) => self.ledger_unavailable(&req, &e, &mut verdict),
        }
        if let Err(e) = self.check_duplicate(&req, &mut verdict).await {
            self.ledger_unavailable(&req, &e, &mut verdict);
        }

        if let (true, Some((lat, lon))) = (verdict.is_valid(), coords) {
            self.commit(&req, lat, lon, now, &mut verdict).await;
        }

        let is_valid = verdict.is_valid();
        let record = PunchValidationRecord {
            id: Uuid::new_v4(),
            employee_code: req.employee_code.clone(),
            lat: req.lat,
            lon: req.lon,
            accuracy: req.accuracy,
            punch_type: req.punch_type,
            is_valid,
            requires_approval: verdict.requires_approval,
            location_type: verdict.location_type.unwrap_or(LocationType::Unknown),
            distance_meters: verdict.matched.as_ref().map(|m| m.distance_meters),
            matched_cluster_id: verdict.matched.as_ref().map(|m| m.cluster_id),
            confidence: verdict.matched.as_ref().map(|m| m.confidence),
            reason_codes: verdict.reasons.clone(),
            violations: verdict.violations.clone(),
            warnings: verdict.warnings.clone(),
            punch_time: req.timestamp,
            evaluated_at: now,
        };
        self.store.insert_validation(&record).await?;

        if let (Some(m), Some((lat, lon))) = (verdict.matched.as_ref(), coords) {
            if m.distance_meters > self.config.violation_audit_meters {
                let violation = GeofenceViolation {
                    validation_id: record.id,
                    employee_code: req.employee_code.clone(),
                    lat,
                    lon,
                    distance_meters: m.distance_meters,
                    cluster_id: Some(m.cluster_id),
                    punch_type: req.punch_type,
                    recorded_at: now,
                };
                // the validation record already carries the verdict; the fault still goes out
                if let Err(e) = self.store.insert_geofence_violation(&violation).await {
                    error!(
                        error = %e,
                        validation_id = %record.id,
                        "Failed to record geofence violation"
                    );
                }
                warn!(
                    employee_code = %req.employee_code,
                    distance = m.distance_meters,
                    "Geofence violation recorded"
                );
                self.faults.publish(FaultEvent::GeofenceViolation {
                    employee_code: req.employee_code.clone(),
                    distance_meters: m.distance_meters,
                });
            }

            if is_valid {
                let learner = self.learner.clone();
                let cluster_id = m.cluster_id;
                tokio::spawn(async move {
                    if let Err(e) = learner.reinforce(cluster_id, lat, lon).await {
                        warn!(error = %e, cluster_id, "Cluster reinforcement failed");
                    }
                });
            }
        }

        info!(
            validation_id = %record.id,
            employee_code = %req.employee_code,
            punch_type = %req.punch_type,
            is_valid,
            requires_approval = record.requires_approval,
            "Mobile punch evaluated"
        );

        Ok(MobilePunchResponse {
            is_valid,
            can_punch: is_valid,
            location_type: record.location_type,
            distance: record.distance_meters,
            confidence: record.confidence,
            violations: record.violations,
            warnings: record.warnings,
            requires_approval: record.requires_approval,
            validation_id: record.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupConfig;
    use crate::geofence::fixed::FixedLearner;
    use crate::integrity::dedup::DuplicatePreventer;
    use crate::store::memory::InMemoryLedger;
    use chrono::NaiveDate;

    const LAT: f64 = 23.8103;
    const LON: f64 = 90.4125;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn office(distance_meters: f64) -> Option<ClusterMatch> {
        Some(ClusterMatch {
            cluster_id: 7,
            location_type: LocationType::Office,
            distance_meters,
            confidence: 0.92,
        })
    }

    struct Fixture {
        store: Arc<InMemoryLedger>,
        learner: Arc<FixedLearner>,
        validator: MobilePunchValidator,
        faults: FaultBus,
    }

    fn fixture(cluster: Option<ClusterMatch>) -> Fixture {
        let store = Arc::new(InMemoryLedger::new());
        let learner = Arc::new(FixedLearner::new(cluster));
        let preventer = Arc::new(DuplicatePreventer::new(store.clone(), DedupConfig::default()));
        let ingestor = Arc::new(PunchIngestor::new(preventer, store.clone()));
        let faults = FaultBus::default();
        let validator = MobilePunchValidator::new(
            ValidatorConfig::default(),
            store.clone(),
            ingestor,
            learner.clone(),
            faults.clone(),
        );
        Fixture {
            store,
            learner,
            validator,
            faults,
        }
    }

    fn request(punch_type: Direction, timestamp: NaiveDateTime) -> MobilePunchRequest {
        MobilePunchRequest {
            employee_code: "EMP-001".into(),
            lat: Some(LAT),
            lon: Some(LON),
            punch_type,
            timestamp,
            accuracy: Some(15.0),
        }
    }

    fn checked_in_at(store: &InMemoryLedger, check_in: NaiveDateTime) {
        let mut record = AttendanceRecord::empty("EMP-001", check_in.date());
        record.check_in = Some(check_in);
        record.status = AttendanceStatus::Present;
        store.put_attendance(record);
    }

    #[tokio::test]
    async fn accepted_check_in_is_committed_and_reinforced() {
        let f = fixture(office(35.0));
        let resp = f
            .validator
            .submit(request(Direction::In, at(9, 0)), at(9, 0))
            .await
            .unwrap();

        assert!(resp.is_valid && resp.can_punch, "{:?}", resp.violations);
        assert_eq!(resp.location_type, LocationType::Office);
        assert_eq!(resp.distance, Some(35.0));

        let rows = f.store.attendance_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].check_in, Some(at(9, 0)));
        assert_eq!(rows[0].punch_source, Some(IngestSource::Mobile));
        assert_eq!(rows[0].geo_lat, Some(LAT));

        for _ in 0..10 {
            if !f.learner.reinforced.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*f.learner.reinforced.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn checkout_beyond_twelve_hours_is_rejected() {
        let f = fixture(office(20.0));
        checked_in_at(&f.store, at(9, 0));

        let resp = f
            .validator
            .submit(request(Direction::Out, at(21, 30)), at(21, 30))
            .await
            .unwrap();

        assert!(!resp.is_valid);
        assert!(
            resp.violations
                .contains(&"Maximum 12 hours per day exceeded".to_string())
        );
        assert_eq!(f.store.attendance_rows()[0].check_out, None);
    }

    #[tokio::test]
    async fn exactly_twelve_hours_is_accepted_with_approval() {
        let f = fixture(office(20.0));
        checked_in_at(&f.store, at(9, 0));

        let resp = f
            .validator
            .submit(request(Direction::Out, at(21, 0)), at(21, 0))
            .await
            .unwrap();

        assert!(resp.is_valid, "{:?}", resp.violations);
        assert!(resp.requires_approval);
        assert_eq!(f.store.attendance_rows()[0].total_hours, 12.0);
    }

    #[tokio::test]
    async fn far_punch_is_blocked_and_audited_as_violation() {
        let f = fixture(office(1_500.0));
        let mut rx = f.faults.subscribe();

        let resp = f
            .validator
            .submit(request(Direction::In, at(9, 0)), at(9, 0))
            .await
            .unwrap();

        assert!(!resp.can_punch);
        assert_eq!(resp.distance, Some(1_500.0));
        let violations = f.store.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].validation_id, resp.validation_id);
        assert!(f.store.attendance_rows().is_empty());
        assert!(matches!(
            rx.try_recv(),
            Ok(FaultEvent::GeofenceViolation { .. })
        ));
    }

    #[tokio::test]
    async fn boundaries_are_inclusive() {
        let f = fixture(office(200.0));
        let mut req = request(Direction::In, at(9, 0));
        req.accuracy = Some(100.0);
        assert!(f.validator.submit(req, at(9, 0)).await.unwrap().is_valid);

        let f = fixture(office(200.1));
        assert!(
            !f.validator
                .submit(request(Direction::In, at(9, 0)), at(9, 0))
                .await
                .unwrap()
                .is_valid
        );

        let f = fixture(office(10.0));
        let mut req = request(Direction::In, at(9, 0));
        req.accuracy = Some(100.5);
        assert!(!f.validator.submit(req, at(9, 0)).await.unwrap().is_valid);
    }

    #[tokio::test]
    async fn acceptance_is_monotonic_in_distance() {
        let mut accepted = Vec::new();
        for distance in [0.0, 50.0, 150.0, 199.9, 200.0, 200.5, 800.0, 1_200.0] {
            let f = fixture(office(distance));
            let resp = f
                .validator
                .submit(request(Direction::In, at(9, 0)), at(9, 0))
                .await
                .unwrap();
            accepted.push(resp.is_valid);
        }
        // once rejected, every larger distance stays rejected
        let first_reject = accepted.iter().position(|a| !a).unwrap();
        assert_eq!(first_reject, 5);
        assert!(accepted[first_reject..].iter().all(|a| !a));
    }

    #[tokio::test]
    async fn unknown_location_is_a_valid_outcome() {
        let f = fixture(None);
        let resp = f
            .validator
            .submit(request(Direction::In, at(9, 0)), at(9, 0))
            .await
            .unwrap();
        assert!(resp.is_valid);
        assert_eq!(resp.location_type, LocationType::Unknown);
        assert!(!resp.warnings.is_empty());
        assert!(f.learner.reinforced.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_coordinates_reject_and_still_audit() {
        let f = fixture(office(10.0));
        let mut req = request(Direction::In, at(9, 0));
        req.lat = None;

        let resp = f.validator.submit(req, at(9, 0)).await.unwrap();
        assert_eq!(resp.violations, vec!["GPS coordinates required".to_string()]);

        let audit = f.store.validations();
        assert_eq!(audit.len(), 1);
        assert!(!audit[0].is_valid);
        assert_eq!(audit[0].reason_codes, vec![ReasonCode::MissingCoordinates]);
    }

    #[tokio::test]
    async fn timing_rules() {
        let f = fixture(office(10.0));
        let future = f
            .validator
            .submit(request(Direction::In, at(9, 5)), at(9, 0))
            .await
            .unwrap();
        assert!(!future.is_valid);

        let late = f
            .validator
            .submit(request(Direction::In, at(6, 0)), at(9, 0))
            .await
            .unwrap();
        assert!(late.is_valid && late.requires_approval);

        let stale = f
            .validator
            .submit(request(Direction::In, at(8, 0)), at(8, 0) + Duration::hours(25))
            .await
            .unwrap();
        assert!(!stale.is_valid);
        assert_eq!(f.store.validations().len(), 3);
    }

    #[tokio::test]
    async fn second_checkout_within_five_minutes_is_duplicate() {
        let f = fixture(office(10.0));
        checked_in_at(&f.store, at(8, 0));

        let first = f
            .validator
            .submit(request(Direction::Out, at(17, 0)), at(17, 0))
            .await
            .unwrap();
        assert!(first.is_valid);

        let second = f
            .validator
            .submit(request(Direction::Out, at(17, 3)), at(17, 3))
            .await
            .unwrap();
        assert!(!second.is_valid);
        let audit = f.store.validations();
        assert!(audit[1].reason_codes.contains(&ReasonCode::DuplicatePunch));
    }

    #[tokio::test]
    async fn check_in_over_open_check_in_and_orphan_checkout_are_rejected() {
        let f = fixture(office(10.0));
        checked_in_at(&f.store, at(8, 0));
        let again = f
            .validator
            .submit(request(Direction::In, at(10, 0)), at(10, 0))
            .await
            .unwrap();
        assert!(!again.is_valid);

        let g = fixture(office(10.0));
        let orphan = g
            .validator
            .submit(request(Direction::Out, at(17, 0)), at(17, 0))
            .await
            .unwrap();
        assert!(!orphan.is_valid);
        assert_eq!(
            g.store.validations()[0].reason_codes,
            vec![ReasonCode::NoOpenCheckIn]
        );
    }

    #[tokio::test]
    async fn failed_commit_can_be_retried_right_away() {
        let f = fixture(office(20.0));
        f.store.fail_next_records(1);

        let first = f
            .validator
            .submit(request(Direction::In, at(9, 0)), at(9, 0))
            .await
            .unwrap();
        assert!(!first.is_valid);
        assert_eq!(
            f.store.validations()[0].reason_codes,
            vec![ReasonCode::CommitFailed]
        );
        assert_eq!(f.store.raw_count(), 0);

        let retry = f
            .validator
            .submit(request(Direction::In, at(9, 1)), at(9, 1))
            .await
            .unwrap();
        assert!(retry.is_valid, "{:?}", retry.violations);
        let rows = f.store.attendance_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].check_in, Some(at(9, 1)));
    }

    #[tokio::test]
    async fn ledger_read_failure_rejects_and_still_audits() {
        let f = fixture(office(20.0));
        // both the day record and the last-punch lookup fail
        f.store.fail_next_reads(2);

        let resp = f
            .validator
            .submit(request(Direction::In, at(9, 0)), at(9, 0))
            .await
            .unwrap();
        assert!(!resp.is_valid);
        assert_eq!(resp.violations.len(), 1);

        let audit = f.store.validations();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].reason_codes, vec![ReasonCode::LedgerUnavailable]);
        assert!(f.store.attendance_rows().is_empty());
    }

    #[tokio::test]
    async fn violation_row_failure_still_answers_and_raises_fault() {
        let f = fixture(office(1_500.0));
        let mut rx = f.faults.subscribe();
        f.store.fail_next_violation_inserts(1);

        let resp = f
            .validator
            .submit(request(Direction::In, at(9, 0)), at(9, 0))
            .await
            .unwrap();
        assert!(!resp.can_punch);
        assert_eq!(f.store.validations().len(), 1);
        assert!(f.store.violations().is_empty());
        assert!(matches!(
            rx.try_recv(),
            Ok(FaultEvent::GeofenceViolation { .. })
        ));
    }

    #[tokio::test]
    async fn removed_day_cannot_be_punched() {
        let f = fixture(office(10.0));
        let mut record = AttendanceRecord::empty("EMP-001", at(9, 0).date());
        record.status = AttendanceStatus::Deleted;
        f.store.put_attendance(record);

        for punch_type in [Direction::In, Direction::Out] {
            let resp = f
                .validator
                .submit(request(punch_type, at(10, 0)), at(10, 0))
                .await
                .unwrap();
            assert!(!resp.is_valid);
        }
        let audit = f.store.validations();
        assert!(
            audit
                .iter()
                .all(|v| v.reason_codes == vec![ReasonCode::DayDeleted])
        );
        assert_eq!(f.store.attendance_rows()[0].status, AttendanceStatus::Deleted);
        assert_eq!(f.store.raw_count(), 0);
    }
}
