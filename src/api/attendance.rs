use crate::auth::auth::AuthUser;
use crate::integrity::IntegrityEngine;
use crate::integrity::validator::{MobilePunchRequest, MobilePunchResponse};
use crate::model::punch::Direction;
use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct MobilePunchBody {
    #[schema(example = 23.8103)]
    pub lat: Option<f64>,
    #[schema(example = 90.4125)]
    pub lon: Option<f64>,
    pub punch_type: Direction,
    /// Device time of the punch; defaults to server time.
    #[schema(value_type = Option<String>, format = "date-time", example = "2026-03-02T09:00:00")]
    pub timestamp: Option<NaiveDateTime>,
    /// Reported GPS accuracy in meters.
    #[schema(example = 12.5)]
    pub accuracy: Option<f64>,
}

/// Mobile GPS punch
#[utoipa::path(
    post,
    path = "/api/attendance/mobile-punch",
    request_body = MobilePunchBody,
    responses(
        (status = 200, description = "Punch accepted and recorded", body = MobilePunchResponse),
        (status = 422, description = "Punch rejected; violations explain why", body = MobilePunchResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile linked to this account"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn submit_mobile_punch(
    auth: AuthUser,
    engine: web::Data<IntegrityEngine>,
    body: web::Json<MobilePunchBody>,
) -> actix_web::Result<impl Responder> {
    let employee_code = auth.require_employee_code()?.to_string();
    let now = Local::now().naive_local();
    let body = body.into_inner();

    let request = MobilePunchRequest {
        employee_code,
        lat: body.lat,
        lon: body.lon,
        punch_type: body.punch_type,
        timestamp: body.timestamp.unwrap_or(now),
        accuracy: body.accuracy,
    };

    let response = engine.validator.submit(request, now).await?;

    if response.is_valid {
        Ok(HttpResponse::Ok().json(response))
    } else {
        Ok(HttpResponse::UnprocessableEntity().json(response))
    }
}
