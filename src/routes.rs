use crate::{
    api::{attendance, integrity},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> anyhow::Result<Limiter> {
    let burst = requests_per_min.max(1);
    let per_ms = (60_000 / burst as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid rate limit: {} per minute", requests_per_min))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

/// Built once at startup and shared by every worker.
#[derive(Clone)]
pub struct RateLimiters {
    protected: Limiter,
    mobile_punch: Limiter,
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            protected: build_limiter(config.rate_protected_per_min)?,
            mobile_punch: build_limiter(config.rate_mobile_punch_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &RateLimiters) {
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiters.protected.clone()) // rate limiting
            .service(
                web::scope("/attendance")
                    // /attendance/mobile-punch
                    .service(
                        web::resource("/mobile-punch")
                            .wrap(limiters.mobile_punch.clone())
                            .route(web::post().to(attendance::submit_mobile_punch)),
                    ),
            )
            .service(
                web::scope("/integrity")
                    .service(
                        web::resource("/consistency")
                            .route(web::get().to(integrity::consistency_status)),
                    )
                    .service(
                        web::resource("/consistency/check")
                            .route(web::post().to(integrity::run_consistency_check)),
                    )
                    .service(web::resource("/gaps").route(web::get().to(integrity::gap_analysis)))
                    .service(
                        web::resource("/gaps/summary").route(web::get().to(integrity::gap_summary)),
                    )
                    .service(web::resource("/heal").route(web::post().to(integrity::heal_dates)))
                    .service(
                        web::resource("/heal/range").route(web::post().to(integrity::heal_id_range)),
                    )
                    .service(
                        web::resource("/dedup/cleanup")
                            .route(web::post().to(integrity::dedup_cleanup)),
                    )
                    .service(
                        web::resource("/poller").route(web::get().to(integrity::poller_status)),
                    ),
            ),
    );
}
