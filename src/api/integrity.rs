use crate::auth::auth::AuthUser;
use crate::integrity::IntegrityEngine;
use crate::integrity::gap::GapSummary;
use crate::integrity::healer::{DayHealResult, HealReport};
use crate::model::consistency::ConsistencySnapshot;
use crate::model::coverage::{DayCoverage, PollWindow};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Longest range a single gap analysis may cover.
const MAX_ANALYSIS_DAYS: i64 = 62;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SummaryQuery {
    /// Lookback in days, today included (default 7)
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RangeQuery {
    #[param(value_type = String, format = "date", example = "2026-03-01")]
    pub from: NaiveDate,
    #[param(value_type = String, format = "date", example = "2026-03-07")]
    pub to: NaiveDate,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HealRequest {
    #[schema(value_type = Vec<String>, example = json!(["2026-03-02"]))]
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HealRangeRequest {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub start_id: i64,
    pub end_id: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CleanupQuery {
    /// Sweep window in hours (default from configuration)
    pub hours: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupResponse {
    pub hours: i64,
    pub merged: u64,
}

fn validate_range(from: NaiveDate, to: NaiveDate) -> actix_web::Result<()> {
    if from > to {
        return Err(actix_web::error::ErrorBadRequest("'from' must not be after 'to'"));
    }
    if (to - from).num_days() >= MAX_ANALYSIS_DAYS {
        return Err(actix_web::error::ErrorBadRequest(format!(
            "Range may cover at most {} days",
            MAX_ANALYSIS_DAYS
        )));
    }
    Ok(())
}

/// Latest consistency snapshot
#[utoipa::path(
    get,
    path = "/api/integrity/consistency",
    responses(
        (status = 200, description = "Latest snapshot; a check runs first if none exists", body = ConsistencySnapshot),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Integrity"
)]
pub async fn consistency_status(
    auth: AuthUser,
    engine: web::Data<IntegrityEngine>,
) -> actix_web::Result<impl Responder> {
    auth.require_operator()?;
    let snapshot = engine.monitor.status(Local::now().naive_local()).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

/// Run a consistency check now
#[utoipa::path(
    post,
    path = "/api/integrity/consistency/check",
    responses(
        (status = 200, description = "Fresh snapshot", body = ConsistencySnapshot),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Integrity"
)]
pub async fn run_consistency_check(
    auth: AuthUser,
    engine: web::Data<IntegrityEngine>,
) -> actix_web::Result<impl Responder> {
    auth.require_operator()?;
    let snapshot = engine.monitor.check(Local::now().naive_local()).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

/// Gap summary over the last N days
#[utoipa::path(
    get,
    path = "/api/integrity/gaps/summary",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Coverage summary", body = GapSummary),
        (status = 400, description = "Invalid lookback"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Integrity"
)]
pub async fn gap_summary(
    auth: AuthUser,
    engine: web::Data<IntegrityEngine>,
    query: web::Query<SummaryQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_operator()?;
    let days = query.days.unwrap_or(7);
    if days < 1 {
        return Err(actix_web::error::ErrorBadRequest("'days' must be at least 1"));
    }

    let to = Local::now().date_naive();
    let from = to - Duration::days(days - 1);
    validate_range(from, to)?;

    let summary = engine.detector.summary(from, to).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Per-day coverage analysis
#[utoipa::path(
    get,
    path = "/api/integrity/gaps",
    params(RangeQuery),
    responses(
        (status = 200, description = "Coverage of every day in the range", body = [DayCoverage]),
        (status = 400, description = "Invalid range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Integrity"
)]
pub async fn gap_analysis(
    auth: AuthUser,
    engine: web::Data<IntegrityEngine>,
    query: web::Query<RangeQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_operator()?;
    validate_range(query.from, query.to)?;
    let days = engine.detector.analyze_range(query.from, query.to).await?;
    Ok(HttpResponse::Ok().json(days))
}

/// Heal the given days
#[utoipa::path(
    post,
    path = "/api/integrity/heal",
    request_body = HealRequest,
    responses(
        (status = 200, description = "Heal report; unresolved days are listed as remnants", body = HealReport),
        (status = 400, description = "No dates given"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Integrity"
)]
pub async fn heal_dates(
    auth: AuthUser,
    engine: web::Data<IntegrityEngine>,
    body: web::Json<HealRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_operator()?;
    let mut dates = body.into_inner().dates;
    if dates.is_empty() {
        return Err(actix_web::error::ErrorBadRequest("'dates' must not be empty"));
    }
    dates.sort_unstable();
    dates.dedup();

    tracing::info!(user_id = auth.user_id, days = dates.len(), "Operator heal requested");
    let report = engine.healer.heal_dates(&dates).await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Heal one day with explicit id bounds
#[utoipa::path(
    post,
    path = "/api/integrity/heal/range",
    request_body = HealRangeRequest,
    responses(
        (status = 200, description = "Result for the day", body = DayHealResult),
        (status = 400, description = "start_id greater than end_id"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Integrity"
)]
pub async fn heal_id_range(
    auth: AuthUser,
    engine: web::Data<IntegrityEngine>,
    body: web::Json<HealRangeRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_operator()?;
    let req = body.into_inner();
    tracing::info!(
        user_id = auth.user_id,
        date = %req.date,
        start_id = req.start_id,
        end_id = req.end_id,
        "Operator id-range heal requested"
    );
    let result = engine
        .healer
        .heal_id_range(req.date, req.start_id, req.end_id)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

/// Sweep near-duplicate punches
#[utoipa::path(
    post,
    path = "/api/integrity/dedup/cleanup",
    params(CleanupQuery),
    responses(
        (status = 200, description = "Number of rows merged", body = CleanupResponse),
        (status = 400, description = "Invalid window"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Integrity"
)]
pub async fn dedup_cleanup(
    auth: AuthUser,
    engine: web::Data<IntegrityEngine>,
    query: web::Query<CleanupQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_operator()?;
    let hours = query.hours.unwrap_or(engine.preventer.cleanup_hours());
    if !(1..=24 * 31).contains(&hours) {
        return Err(actix_web::error::ErrorBadRequest("'hours' must be between 1 and 744"));
    }
    let merged = engine
        .preventer
        .cleanup(Local::now().naive_local(), hours)
        .await?;
    Ok(HttpResponse::Ok().json(CleanupResponse { hours, merged }))
}

/// Last poll window
#[utoipa::path(
    get,
    path = "/api/integrity/poller",
    responses(
        (status = 200, description = "Most recent poll window", body = PollWindow),
        (status = 404, description = "No poll has run yet"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Integrity"
)]
pub async fn poller_status(
    auth: AuthUser,
    engine: web::Data<IntegrityEngine>,
) -> actix_web::Result<impl Responder> {
    auth.require_operator()?;
    match engine.poller.last_window().await {
        Some(window) => Ok(HttpResponse::Ok().json(window)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "message": "No poll has run yet"
        }))),
    }
}
