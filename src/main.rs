use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use chrono::Local;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod geofence;
mod integrity;
mod model;
mod models;
mod routes;
mod source;
mod store;
mod utils;

use config::Config;
use db::init_db;
use geofence::sql::SqlGeofenceLearner;
use integrity::IntegrityEngine;
use routes::RateLimiters;
use source::vendor::VendorApiClient;
use store::mysql::MySqlLedger;

use crate::docs::ApiDoc;
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

/// Keys loaded per batch when warming the dedup filter and cache.
const WARMUP_BATCH: usize = 500;

#[get("/health")]
async fn health() -> impl Responder {
    "OK"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await?;

    let store = Arc::new(MySqlLedger::new(pool.clone()));
    let source = Arc::new(VendorApiClient::new(config.vendor.clone())?);
    let learner = Arc::new(SqlGeofenceLearner::new(pool.clone()));
    let engine = Data::new(IntegrityEngine::new(&config, store, source, learner));

    // Filter/cache warmup runs before the first poll so overlap re-reads hit the fast path
    if let Err(e) = engine
        .preventer
        .warmup(Local::now().naive_local(), WARMUP_BATCH)
        .await
    {
        error!(error = %e, "Failed to warm up punch dedup keys");
    }

    let cancel = CancellationToken::new();
    let tasks = engine.start(&cancel);

    let limiters = RateLimiters::from_config(&config)?;
    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);
    let engine_data = engine.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(config_data.clone())
            .app_data(engine_data.clone())
            .service(health)
            // integrity + mobile punch routes behind auth and rate limiting
            .configure(|cfg| routes::configure(cfg, &config_data, &limiters))
    })
    .bind(server_addr)?
    .run()
    .await?;

    info!("Server stopped, waiting for in-flight ticks");
    cancel.cancel();
    futures::future::join_all(tasks).await;

    Ok(())
}
