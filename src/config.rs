use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::{IntegrityError, Result};

#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub interval_minutes: i64,
    pub overlap_minutes: i64,
    /// Width of every poll window. Must be at least twice the interval.
    pub retrieval_minutes: i64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Upper bound on how far back a catch-up window may reach after failed polls.
    pub max_catchup_minutes: i64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            overlap_minutes: 2,
            retrieval_minutes: 10,
            max_retries: 3,
            retry_delay_ms: 5_000,
            max_catchup_minutes: 24 * 60,
        }
    }
}

impl PollerConfig {
    /// Rejects configurations whose windows could leave holes between ticks.
    pub fn validate(self) -> Result<Self> {
        if self.interval_minutes <= 0 {
            return Err(IntegrityError::Config(
                "POLL_INTERVAL_MINUTES must be positive".into(),
            ));
        }
        if self.retrieval_minutes < 2 * self.interval_minutes {
            return Err(IntegrityError::Config(format!(
                "POLL_RETRIEVAL_MINUTES ({}) must be at least twice POLL_INTERVAL_MINUTES ({})",
                self.retrieval_minutes, self.interval_minutes
            )));
        }
        if self.overlap_minutes <= 0 || self.overlap_minutes > self.retrieval_minutes {
            return Err(IntegrityError::Config(format!(
                "POLL_OVERLAP_MINUTES ({}) must be in 1..={}",
                self.overlap_minutes, self.retrieval_minutes
            )));
        }
        Ok(self)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes as u64 * 60)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Clone, Debug)]
pub struct HealerConfig {
    pub interval_minutes: u64,
    pub chunk_size: i64,
    pub lookback_days: i64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            chunk_size: 100,
            lookback_days: 3,
            max_retries: 3,
            retry_delay_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsistencyConfig {
    pub interval_minutes: u64,
    /// Percentage below which a tick is flagged.
    pub min_attendance_rate: f64,
    /// Consecutive failures after which the monitor escalates to error-level logging.
    pub alert_after_failures: u32,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
            min_attendance_rate: 80.0,
            alert_after_failures: 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    pub max_accuracy_meters: f64,
    pub geofence_radius_meters: f64,
    pub violation_audit_meters: f64,
    pub future_tolerance_secs: i64,
    pub approval_age_hours: i64,
    pub max_age_hours: i64,
    pub max_daily_hours: f64,
    pub standard_day_hours: f64,
    pub max_overtime_hours: f64,
    pub duplicate_window_minutes: i64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_accuracy_meters: 100.0,
            geofence_radius_meters: 200.0,
            violation_audit_meters: 1_000.0,
            future_tolerance_secs: 60,
            approval_age_hours: 2,
            max_age_hours: 24,
            max_daily_hours: 12.0,
            standard_day_hours: 8.0,
            max_overtime_hours: 3.0,
            duplicate_window_minutes: 5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DedupConfig {
    pub filter_capacity: usize,
    pub false_positive_rate: f64,
    pub cache_capacity: u64,
    pub cache_ttl_hours: u64,
    pub warmup_hours: i64,
    pub cleanup_hours: i64,
    pub cleanup_interval_minutes: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            filter_capacity: 100_000,
            false_positive_rate: 0.001,
            cache_capacity: 500_000,
            cache_ttl_hours: 48,
            warmup_hours: 48,
            cleanup_hours: 24,
            cleanup_interval_minutes: 60,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VendorConfig {
    pub base_url: String,
    pub api_token: String,
    pub requests_per_second: u32,
    pub timeout_secs: u64,
    pub page_size: u32,
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    // Rate limiting
    pub rate_protected_per_min: u32,
    pub rate_mobile_punch_per_min: u32,

    pub api_prefix: String,

    pub vendor: VendorConfig,
    pub poller: PollerConfig,
    pub healer: HealerConfig,
    pub consistency: ConsistencyConfig,
    pub validator: ValidatorConfig,
    pub dedup: DedupConfig,
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| IntegrityError::Config(format!("{} must be set", key)))
}

fn or_default<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| IntegrityError::Config(format!("{} has an invalid value '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let poller = PollerConfig::default();
        let poller = PollerConfig {
            interval_minutes: or_default("POLL_INTERVAL_MINUTES", poller.interval_minutes)?,
            overlap_minutes: or_default("POLL_OVERLAP_MINUTES", poller.overlap_minutes)?,
            retrieval_minutes: or_default("POLL_RETRIEVAL_MINUTES", poller.retrieval_minutes)?,
            max_retries: or_default("POLL_MAX_RETRIES", poller.max_retries)?,
            retry_delay_ms: or_default("POLL_RETRY_DELAY_MS", poller.retry_delay_ms)?,
            max_catchup_minutes: or_default("POLL_MAX_CATCHUP_MINUTES", poller.max_catchup_minutes)?,
        }
        .validate()?;

        let healer = HealerConfig::default();
        let healer = HealerConfig {
            interval_minutes: or_default("HEAL_INTERVAL_MINUTES", healer.interval_minutes)?,
            chunk_size: or_default("HEAL_CHUNK_SIZE", healer.chunk_size)?,
            lookback_days: or_default("HEAL_LOOKBACK_DAYS", healer.lookback_days)?,
            max_retries: or_default("HEAL_MAX_RETRIES", healer.max_retries)?,
            retry_delay_ms: or_default("HEAL_RETRY_DELAY_MS", healer.retry_delay_ms)?,
        };
        if healer.chunk_size <= 0 {
            return Err(IntegrityError::Config("HEAL_CHUNK_SIZE must be positive".into()));
        }

        let consistency = ConsistencyConfig::default();
        let consistency = ConsistencyConfig {
            interval_minutes: or_default(
                "CONSISTENCY_INTERVAL_MINUTES",
                consistency.interval_minutes,
            )?,
            min_attendance_rate: or_default(
                "CONSISTENCY_MIN_ATTENDANCE_RATE",
                consistency.min_attendance_rate,
            )?,
            alert_after_failures: or_default(
                "CONSISTENCY_ALERT_AFTER_FAILURES",
                consistency.alert_after_failures,
            )?,
        };

        let validator = ValidatorConfig::default();
        let validator = ValidatorConfig {
            max_accuracy_meters: or_default("GPS_MAX_ACCURACY_METERS", validator.max_accuracy_meters)?,
            geofence_radius_meters: or_default(
                "GEOFENCE_RADIUS_METERS",
                validator.geofence_radius_meters,
            )?,
            violation_audit_meters: or_default(
                "GEOFENCE_VIOLATION_METERS",
                validator.violation_audit_meters,
            )?,
            ..validator
        };

        let dedup = DedupConfig::default();
        let dedup = DedupConfig {
            cache_ttl_hours: or_default("DEDUP_CACHE_TTL_HOURS", dedup.cache_ttl_hours)?,
            warmup_hours: or_default("DEDUP_WARMUP_HOURS", dedup.warmup_hours)?,
            cleanup_hours: or_default("DEDUP_CLEANUP_HOURS", dedup.cleanup_hours)?,
            ..dedup
        };

        let vendor = VendorConfig {
            base_url: required("VENDOR_API_URL")?,
            api_token: required("VENDOR_API_TOKEN")?,
            requests_per_second: or_default("VENDOR_REQUESTS_PER_SEC", 2)?,
            timeout_secs: or_default("VENDOR_TIMEOUT_SECS", 30)?,
            page_size: or_default("VENDOR_PAGE_SIZE", 500)?,
        };

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            rate_protected_per_min: or_default("RATE_PROTECTED_PER_MIN", 1000)?,
            rate_mobile_punch_per_min: or_default("RATE_MOBILE_PUNCH_PER_MIN", 30)?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            vendor,
            poller,
            healer,
            consistency,
            validator,
            dedup,
        })
    }
}
