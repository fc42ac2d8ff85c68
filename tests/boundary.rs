//! Boundary behaviors: zero-sized configs, a threshold-1 circuit breaker, and the public
//! cache introspection surface on an empty/just-populated pipeline.

use resilient_client::{ConfigError, EndpointKey, Fingerprint, PipelineConfig, RawUpstreamError};
use std::time::Duration;

#[test]
fn zero_max_requests_fails_validation() {
    let mut config = PipelineConfig::default();
    config.rate_limit.max_requests = 0;
    assert!(matches!(config.validate(), Err(ConfigError::ZeroMaxRequests)));
}

#[test]
fn zero_retry_budget_still_validates() {
    let mut config = PipelineConfig::default();
    config.retry.max_retries = 0;
    assert!(config.validate().is_ok(), "zero retries is a valid (if aggressive) policy, not a config error");
}

#[tokio::test]
async fn threshold_one_breaker_opens_on_the_first_failure() {
    let mut config = PipelineConfig::default();
    config.retry.max_retries = 0;
    config.retry.initial_delay_ms = Duration::from_millis(1);
    config.circuit_breaker.volume_threshold = 1;

    let pipeline: resilient_client::Pipeline<i32> = resilient_client::Pipeline::new(&config);
    let endpoint = EndpointKey::new("quote");

    let result = pipeline
        .execute(&Fingerprint::new("quote:FAIL"), &endpoint, || async {
            Err::<i32, _>(RawUpstreamError::new("connection refused"))
        })
        .await;
    assert!(result.is_err());

    let stats = pipeline.get_stats(&endpoint).await;
    assert_eq!(stats.circuit_breaker.state, resilient_client::CircuitState::Open);
}

#[tokio::test]
async fn cache_scan_on_an_empty_pipeline_returns_no_keys() {
    let pipeline: resilient_client::Pipeline<i32> = resilient_client::Pipeline::new(&PipelineConfig::default());
    let stats = pipeline.get_stats(&EndpointKey::new("quote")).await;
    assert_eq!(stats.cache.entries, 0);
    assert_eq!(stats.request_count, 0);
}
