use crate::api::attendance::MobilePunchBody;
use crate::api::integrity::{CleanupResponse, HealRangeRequest, HealRequest};
use crate::integrity::gap::{GapSummary, HealTarget};
use crate::integrity::healer::{DayHealResult, HealReport};
use crate::integrity::validator::MobilePunchResponse;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::consistency::ConsistencySnapshot;
use crate::model::coverage::{DayCoverage, IdGap, PollWindow};
use crate::model::geofence::LocationType;
use crate::model::punch::{Direction, IngestSource};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Integrity API",
        version = "0.1.0",
        description = r#"
## Attendance Integrity Engine

Keeps the attendance ledger complete and trustworthy while punches arrive from a lossy
biometric vendor API and from mobile GPS self-service.

### 🔹 Endpoints
- **Mobile punch**: validated against learned geofences, timing and overbilling rules, then
  committed synchronously. Rejections return `422` with the violations to show the employee.
- **Integrity operations** (HR/Admin): consistency status, coverage gaps, targeted heals,
  near-duplicate sweeps and the last poll window.

### 🔐 Security
All endpoints require a **JWT Bearer** access token.
"#,
    ),
    paths(
        crate::api::attendance::submit_mobile_punch,

        crate::api::integrity::consistency_status,
        crate::api::integrity::run_consistency_check,
        crate::api::integrity::gap_summary,
        crate::api::integrity::gap_analysis,
        crate::api::integrity::heal_dates,
        crate::api::integrity::heal_id_range,
        crate::api::integrity::dedup_cleanup,
        crate::api::integrity::poller_status
    ),
    components(
        schemas(
            MobilePunchBody,
            MobilePunchResponse,
            Direction,
            IngestSource,
            LocationType,
            AttendanceRecord,
            AttendanceStatus,
            ConsistencySnapshot,
            GapSummary,
            DayCoverage,
            IdGap,
            PollWindow,
            HealRequest,
            HealRangeRequest,
            HealTarget,
            HealReport,
            DayHealResult,
            CleanupResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Mobile punch submission"),
        (name = "Integrity", description = "Ingestion integrity operations"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
