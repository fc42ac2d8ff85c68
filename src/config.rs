//! Aggregate pipeline configuration (SPEC_FULL §6).
//!
//! Every group is `serde::{Serialize, Deserialize}` with `Default` impls matching the
//! documented defaults: one flat, deserializable struct rather than per-pattern builders,
//! since the host loads this from a single config file/env layer rather than constructing
//! each middleware independently.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn duration_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let ms = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(ms))
}

fn duration_ms_ser<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitStrategy {
    TokenBucket,
    FixedWindow,
    SlidingWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub strategy: RateLimitStrategy,
    pub max_requests: u32,
    #[serde(serialize_with = "duration_ms_ser", deserialize_with = "duration_ms")]
    pub window_ms: Duration,
    pub token_refill_rate: f64,
    pub requests_per_minute: u64,
    pub requests_per_hour: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strategy: RateLimitStrategy::TokenBucket,
            max_requests: 10,
            window_ms: Duration::from_secs(1),
            token_refill_rate: 2.0,
            requests_per_minute: 60,
            requests_per_hour: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStoreKind {
    Memory,
    Redis,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub store: CacheStoreKind,
    #[serde(serialize_with = "duration_ms_ser", deserialize_with = "duration_ms")]
    pub ttl_ms: Duration,
    pub max_entries: usize,
    #[serde(serialize_with = "duration_ms_ser", deserialize_with = "duration_ms")]
    pub stale_while_revalidate_ms: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store: CacheStoreKind::Memory,
            ttl_ms: Duration::from_secs(60),
            max_entries: 10_000,
            stale_while_revalidate_ms: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategyKind {
    Exponential,
    Linear,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_retries: u32,
    #[serde(serialize_with = "duration_ms_ser", deserialize_with = "duration_ms")]
    pub initial_delay_ms: Duration,
    #[serde(serialize_with = "duration_ms_ser", deserialize_with = "duration_ms")]
    pub max_delay_ms: Duration,
    pub strategy: RetryStrategyKind,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    pub retryable_status_codes: Vec<u16>,
    pub retryable_error_codes: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_delay_ms: Duration::from_millis(200),
            max_delay_ms: Duration::from_secs(30),
            strategy: RetryStrategyKind::Exponential,
            backoff_multiplier: 2.0,
            jitter: true,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
            retryable_error_codes: Vec::new(),
        }
    }
}

impl RetryConfig {
    pub fn to_strategy(&self) -> crate::retry::BackoffStrategy {
        match self.strategy {
            RetryStrategyKind::Exponential => crate::retry::BackoffStrategy::Exponential {
                initial: self.initial_delay_ms,
                multiplier: self.backoff_multiplier,
            },
            RetryStrategyKind::Linear => crate::retry::BackoffStrategy::Linear {
                initial: self.initial_delay_ms,
                increment: self.initial_delay_ms,
            },
            RetryStrategyKind::Fixed => crate::retry::BackoffStrategy::Fixed {
                delay: self.initial_delay_ms,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfigOptions {
    pub error_threshold_percentage: f64,
    #[serde(serialize_with = "duration_ms_ser", deserialize_with = "duration_ms")]
    pub reset_timeout_ms: Duration,
    #[serde(serialize_with = "duration_ms_ser", deserialize_with = "duration_ms")]
    pub rolling_count_timeout_ms: Duration,
    pub volume_threshold: usize,
    pub half_open_max_attempts: u64,
}

impl Default for CircuitBreakerConfigOptions {
    fn default() -> Self {
        Self {
            error_threshold_percentage: 50.0,
            reset_timeout_ms: Duration::from_secs(30),
            rolling_count_timeout_ms: Duration::from_secs(60),
            volume_threshold: 5,
            half_open_max_attempts: 2,
        }
    }
}

impl CircuitBreakerConfigOptions {
    /// This crate gates on an absolute failure count (`volume_threshold`) within the rolling
    /// window rather than `error_threshold_percentage` (DESIGN.md "Circuit breaker"
    /// divergence) — the percentage field is retained for config-surface compatibility with
    /// the option table but not consulted by `circuit::Circuit`.
    pub fn to_circuit_config(&self) -> crate::circuitbreaker::CircuitConfig {
        crate::circuitbreaker::CircuitConfig {
            threshold_failures: self.volume_threshold,
            threshold_successes: self.half_open_max_attempts,
            monitoring_window: self.rolling_count_timeout_ms,
            reset_timeout: self.reset_timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStrategy {
    Fifo,
    Lifo,
    Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_size: usize,
    pub strategy: QueueStrategy,
    pub concurrency: u64,
    #[serde(serialize_with = "duration_ms_ser", deserialize_with = "duration_ms")]
    pub timeout_ms: Duration,
    #[serde(serialize_with = "duration_ms_ser", deserialize_with = "duration_ms")]
    pub processing_timeout_ms: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 1_000,
            // Only FIFO draining is implemented regardless of configured strategy (Open
            // Question 2, see DESIGN.md); lifo/priority are accepted but treated as fifo.
            strategy: QueueStrategy::Fifo,
            concurrency: 20,
            timeout_ms: Duration::from_secs(30),
            processing_timeout_ms: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCompletionLevel {
    Strict,
    Moderate,
    Lenient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataCompletionConfig {
    pub enabled: bool,
    pub level: DataCompletionLevel,
    pub required_fields: Vec<String>,
    pub preferred_fields: Vec<String>,
    pub allow_partial: bool,
    pub fallback_to_cache: bool,
}

impl Default for DataCompletionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: DataCompletionLevel::Moderate,
            required_fields: Vec::new(),
            preferred_fields: Vec::new(),
            allow_partial: true,
            fallback_to_cache: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rate_limit.max_requests must be > 0")]
    ZeroMaxRequests,
    #[error("cache.max_entries must be > 0 when cache.enabled")]
    ZeroCacheCapacity,
    #[error("retry.backoff_multiplier must be > 1.0 for an exponential strategy")]
    InvalidBackoffMultiplier,
    #[error("circuit_breaker.volume_threshold must be > 0")]
    ZeroVolumeThreshold,
    #[error("queue.concurrency must be > 0")]
    ZeroConcurrency,
}

/// Top-level pipeline configuration, aggregating every group in SPEC_FULL §6's table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfigOptions,
    pub queue: QueueConfig,
    pub data_completion: DataCompletionConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }
        if matches!(self.retry.strategy, RetryStrategyKind::Exponential) && self.retry.backoff_multiplier <= 1.0 {
            return Err(ConfigError::InvalidBackoffMultiplier);
        }
        if self.circuit_breaker.volume_threshold == 0 {
            return Err(ConfigError::ZeroVolumeThreshold);
        }
        if self.queue.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}
