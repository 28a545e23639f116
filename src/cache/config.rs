//! Query cache configuration.
//!
//! Freshness windows follow six tiers, from one minute up to a day. Each data
//! type maps to a [`QueryPolicy`] built from those tiers.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use super::keys::DataType;

const DEFAULT_CAPACITY: usize = 512;
const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 5000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_GC_INTERVAL_MS: u64 = 60_000;
const DEFAULT_RETRY: u32 = 2;

const BRIEF: Duration = Duration::from_secs(60);
const SHORT: Duration = Duration::from_secs(5 * 60);
const MEDIUM: Duration = Duration::from_secs(15 * 60);
const LONG: Duration = Duration::from_secs(60 * 60);
const VERY_LONG: Duration = Duration::from_secs(6 * 60 * 60);
const PERSISTENT: Duration = Duration::from_secs(24 * 60 * 60);

/// How a mutation hands its invalidations to the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationMode {
    /// Invalidate inline; the mutation returns after every key is stale.
    #[default]
    Await,
    /// Enqueue and consume on a spawned task; the mutation returns at once.
    Deferred,
}

impl InvalidationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InvalidationMode::Await => "await",
            InvalidationMode::Deferred => "deferred",
        }
    }
}

impl fmt::Display for InvalidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvalidationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "await" => Ok(InvalidationMode::Await),
            "deferred" => Ok(InvalidationMode::Deferred),
            other => Err(format!("unknown invalidation mode `{other}`")),
        }
    }
}

/// Freshness and retry behaviour for one data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    /// Age after which a cached value is re-fetched on access.
    pub stale_time: Duration,
    /// Idle time after which an entry is garbage collected.
    pub gc_time: Duration,
    /// Extra attempts after a failed load.
    pub retry: u32,
}

impl QueryPolicy {
    const fn new(stale_time: Duration, gc_time: Duration) -> Self {
        Self {
            stale_time,
            gc_time,
            retry: DEFAULT_RETRY,
        }
    }

    pub fn for_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Ingredient => Self::new(VERY_LONG, PERSISTENT),
            DataType::Meal | DataType::IngredientsList => Self::new(LONG, VERY_LONG),
            DataType::MealsList => Self::new(MEDIUM, LONG),
            DataType::Plan | DataType::PlansList | DataType::NutritionGoals => {
                Self::new(MEDIUM, LONG)
            }
            DataType::DailyNutrition | DataType::MealSlots | DataType::DailyPlan => {
                Self::new(SHORT, MEDIUM)
            }
            DataType::DailyProgress | DataType::ProgressList => Self::new(BRIEF, SHORT),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false, reads always go to storage and invalidations are skipped.
    pub enabled: bool,
    /// Maximum number of cached queries.
    pub capacity: usize,
    pub invalidation_mode: InvalidationMode,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
    /// Auto-consume interval (ms) for deferred invalidation.
    pub auto_consume_interval_ms: u64,
    /// Interval (ms) between sweeps of idle entries.
    pub gc_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CAPACITY,
            invalidation_mode: InvalidationMode::default(),
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
            auto_consume_interval_ms: DEFAULT_AUTO_CONSUME_INTERVAL_MS,
            gc_interval_ms: DEFAULT_GC_INTERVAL_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            capacity: settings.capacity,
            invalidation_mode: settings.invalidation_mode,
            consume_batch_limit: settings.consume_batch_limit,
            auto_consume_interval_ms: settings.auto_consume_interval_ms,
            gc_interval_ms: settings.gc_interval_ms,
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn auto_consume_interval(&self) -> Duration {
        Duration::from_millis(self.auto_consume_interval_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }

    pub fn policy(&self, data_type: DataType) -> QueryPolicy {
        QueryPolicy::for_type(data_type)
    }
}
