//! External punch source seam (the vendor biometric-terminal API).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::warn;

use crate::error::{IntegrityError, Result};
use crate::model::punch::RawPunchEvent;

pub mod vendor;

#[cfg(test)]
pub mod scripted;

/// Range-queryable punch source. Both queries are idempotent per range and may legitimately
/// return nothing; an empty result is not distinguishable from a silent upstream failure.
#[async_trait]
pub trait PunchSource: Send + Sync {
    async fn fetch_by_time_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RawPunchEvent>>;

    /// Inclusive on both ends.
    async fn fetch_by_id_range(&self, start_id: i64, end_id: i64) -> Result<Vec<RawPunchEvent>>;
}

/// Runs `op` once plus up to `max_retries` retries with a fixed delay between attempts.
/// Only transient source errors are retried. On exhaustion the last error is returned with
/// the number of attempts made.
pub async fn with_fixed_retry<T, F, Fut>(
    what: &str,
    max_retries: u32,
    delay: Duration,
    mut op: F,
) -> std::result::Result<T, (IntegrityError, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(IntegrityError::TransientSource(msg)) if attempt <= max_retries => {
                warn!(attempt, max_retries, error = %msg, "{} failed, retrying", what);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err((e, attempt)),
        }
    }
}
