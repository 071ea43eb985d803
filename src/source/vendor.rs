// Vendor biometric-terminal API client
//
// Transactions endpoint, paginated with a `next` link. Each page costs one request against the
// vendor's rate limit, so every request waits on the governor first.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::VendorConfig;
use crate::error::{IntegrityError, Result};
use crate::model::punch::{Direction, IngestSource, RawPunchEvent};
use crate::source::PunchSource;

const VENDOR_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Hard stop on `next` links, in case the vendor loops.
const MAX_PAGES: usize = 200;

#[derive(Debug, Deserialize)]
struct TransactionPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    data: Vec<VendorTransaction>,
}

#[derive(Debug, Deserialize)]
struct VendorTransaction {
    id: i64,
    emp_code: String,
    punch_time: String,
    #[serde(default)]
    punch_state: String,
}

impl VendorTransaction {
    fn into_event(self, source: IngestSource, ingested_at: NaiveDateTime) -> Option<RawPunchEvent> {
        let punch_time = match NaiveDateTime::parse_from_str(&self.punch_time, VENDOR_TIME_FORMAT)
        {
            Ok(t) => t,
            Err(e) => {
                warn!(id = self.id, punch_time = %self.punch_time, error = %e, "Skipping vendor punch with bad timestamp");
                return None;
            }
        };
        Some(RawPunchEvent {
            external_id: Some(self.id),
            employee_code: self.emp_code.trim().to_string(),
            punch_time,
            direction: Direction::from_vendor_state(&self.punch_state),
            source,
            ingested_at,
        })
    }
}

pub struct VendorApiClient {
    client: reqwest::Client,
    config: VendorConfig,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl VendorApiClient {
    pub fn new(config: VendorConfig) -> Result<Self> {
        let per_second = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            IntegrityError::Config("VENDOR_REQUESTS_PER_SEC must be positive".into())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IntegrityError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    async fn fetch_pages(
        &self,
        query: Vec<(&'static str, String)>,
        source: IngestSource,
    ) -> Result<Vec<RawPunchEvent>> {
        let mut url = format!(
            "{}/iclock/api/transactions/",
            self.config.base_url.trim_end_matches('/')
        );
        let mut query = Some(query);
        let mut events = Vec::new();

        for _ in 0..MAX_PAGES {
            self.rate_limiter.until_ready().await;

            let mut request = self
                .client
                .get(&url)
                .header("Authorization", format!("Token {}", self.config.api_token));
            if let Some(q) = query.take() {
                request = request.query(&q);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(IntegrityError::TransientSource(format!(
                    "vendor API returned {}",
                    status
                )));
            }

            let page: TransactionPage = response.json().await?;
            let ingested_at = Local::now().naive_local();
            events.extend(
                page.data
                    .into_iter()
                    .filter_map(|t| t.into_event(source, ingested_at)),
            );

            match page.next {
                Some(next) if !next.is_empty() => url = next,
                _ => return Ok(events),
            }
        }

        warn!(pages = MAX_PAGES, "Vendor pagination limit reached, returning partial result");
        Ok(events)
    }
}

#[async_trait]
impl PunchSource for VendorApiClient {
    async fn fetch_by_time_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RawPunchEvent>> {
        debug!(%start, %end, "Fetching vendor punches by time");
        self.fetch_pages(
            vec![
                ("start_time", start.format(VENDOR_TIME_FORMAT).to_string()),
                ("end_time", end.format(VENDOR_TIME_FORMAT).to_string()),
                ("page_size", self.config.page_size.to_string()),
            ],
            IngestSource::Poll,
        )
        .await
    }

    async fn fetch_by_id_range(&self, start_id: i64, end_id: i64) -> Result<Vec<RawPunchEvent>> {
        debug!(start_id, end_id, "Fetching vendor punches by id");
        let events = self
            .fetch_pages(
                vec![
                    ("id__gte", start_id.to_string()),
                    ("id__lte", end_id.to_string()),
                    ("page_size", self.config.page_size.to_string()),
                ],
                IngestSource::Heal,
            )
            .await?;
        // the vendor filter is advisory on some firmware
        Ok(events
            .into_iter()
            .filter(|e| e.external_id.is_some_and(|id| id >= start_id && id <= end_id))
            .collect())
    }
}
