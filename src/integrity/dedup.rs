//! Duplicate preventer.
//!
//! Lookup order for a punch key:
//! 1. cuckoo filter: fast negative
//! 2. TTL cache: fast positive
//! 3. ledger store
//!
//! The store's unique key on `raw_punches.dedup_key` stays the final backstop for other
//! instances and for keys evicted from the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::DedupConfig;
use crate::error::Result;
use crate::integrity::ticker::TickTask;
use crate::model::punch::{
    DedupKey, Direction, IngestSource, MOBILE_BUCKET_MINUTES, RawPunchEvent,
};
use crate::store::LedgerStore;
use crate::utils::key_filter::KeyFilter;
use crate::utils::ttl_cache::TtlKeyCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionReason {
    New,
    DuplicateExternalId,
    DuplicateMobileBucket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub accepted: bool,
    pub reason: AdmissionReason,
    pub key: DedupKey,
}

pub struct DuplicatePreventer {
    store: Arc<dyn LedgerStore>,
    filter: KeyFilter,
    cache: TtlKeyCache,
    config: DedupConfig,
    // check-then-remember must be atomic across concurrent writers of this process
    admission: Mutex<()>,
}

impl DuplicatePreventer {
    pub fn new(store: Arc<dyn LedgerStore>, config: DedupConfig) -> Self {
        Self {
            store,
            filter: KeyFilter::new(config.filter_capacity, config.false_positive_rate),
            cache: TtlKeyCache::new(
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_hours * 3600),
            ),
            config,
            admission: Mutex::new(()),
        }
    }

    /// Default sweep window, in hours.
    pub fn cleanup_hours(&self) -> i64 {
        self.config.cleanup_hours
    }

    fn rejection(key: &DedupKey) -> AdmissionReason {
        match key {
            DedupKey::External(_) => AdmissionReason::DuplicateExternalId,
            DedupKey::Mobile { .. } => AdmissionReason::DuplicateMobileBucket,
        }
    }

    /// Decides whether `event` is new. An accepted key is remembered immediately, so a second
    /// admit of the same key in the same batch is rejected. Call [`Self::release`] if the
    /// ledger write for an accepted event fails.
    pub async fn admit(&self, event: &RawPunchEvent) -> Result<Admission> {
        let key = event.dedup_key();
        let key_str = key.to_string();
        let _guard = self.admission.lock().await;

        let seen = if !self.filter.might_contain(&key_str) {
            false
        } else if self.cache.contains(&key_str).await {
            true
        } else {
            self.store.punch_key_exists(&key).await?
        };

        if seen {
            // refresh so repeated overlap re-reads stay on the fast path
            self.cache.mark(&key_str).await;
            debug!(dedup_key = %key_str, "Rejected duplicate punch");
            return Ok(Admission {
                accepted: false,
                reason: Self::rejection(&key),
                key,
            });
        }

        self.filter.insert(&key_str);
        self.cache.mark(&key_str).await;

        Ok(Admission {
            accepted: true,
            reason: AdmissionReason::New,
            key,
        })
    }

    /// Forgets a key whose ledger write did not happen, so a later re-read can admit it.
    pub async fn release(&self, key: &DedupKey) {
        let key_str = key.to_string();
        let _guard = self.admission.lock().await;
        self.filter.remove(&key_str);
        self.cache.forget(&key_str).await;
    }

    /// Loads keys of recently ingested punches into the filter and cache in batches.
    pub async fn warmup(&self, now: NaiveDateTime, batch_size: usize) -> anyhow::Result<()> {
        let since = now - ChronoDuration::hours(self.config.warmup_hours);
        let keys = self.store.recent_punch_keys(since).await?;

        for batch in keys.chunks(batch_size.max(1)) {
            self.filter.insert_batch(batch);
            self.cache.mark_batch(batch).await;
        }

        log::info!(
            "Punch dedup warmup complete: {} keys (last {} hours)",
            keys.len(),
            self.config.warmup_hours
        );
        Ok(())
    }

    /// Sweeps mobile punches ingested in the last `hours` hours and marks same-employee,
    /// same-direction punches within the mobile bucket width of an earlier kept punch as
    /// merged into it. Vendor rows are distinct punches by external id and are left alone.
    /// Rows are never deleted. Returns the number of rows merged.
    pub async fn cleanup(&self, now: NaiveDateTime, hours: i64) -> Result<u64> {
        let since = now - ChronoDuration::hours(hours);
        let rows = self.store.punches_since(since).await?;
        let window = ChronoDuration::minutes(MOBILE_BUCKET_MINUTES);

        let mut last_kept: HashMap<(String, Direction), (i64, NaiveDateTime)> = HashMap::new();
        let mut merges = Vec::new();

        for row in rows {
            let event = &row.event;
            if event.source != IngestSource::Mobile || event.direction == Direction::Unknown {
                continue;
            }
            let group = (event.employee_code.to_lowercase(), event.direction);
            match last_kept.get(&group) {
                Some((kept_id, kept_at)) if event.punch_time - *kept_at < window => {
                    merges.push((row.row_id, *kept_id));
                }
                _ => {
                    last_kept.insert(group, (row.row_id, event.punch_time));
                }
            }
        }

        if merges.is_empty() {
            return Ok(0);
        }

        let merged = self.store.mark_merged(&merges).await?;
        info!(merged, hours, "Near-duplicate punch sweep complete");
        Ok(merged)
    }
}

#[async_trait]
impl TickTask for DuplicatePreventer {
    fn name(&self) -> &'static str {
        "dedup-cleanup"
    }

    async fn tick(&self) {
        let now = Local::now().naive_local();
        if let Err(e) = self.cleanup(now, self.config.cleanup_hours).await {
            tracing::error!(error = %e, "Near-duplicate punch sweep failed");
        }
    }
}
