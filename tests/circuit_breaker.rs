//! Circuit breaker trips on repeated failures and the pipeline falls back to the last
//! known-good value for the endpoint once it does.

use resilient_client::{EndpointKey, Fingerprint, PipelineConfig, RawUpstreamError};
use std::time::Duration;

fn config() -> PipelineConfig {
    let mut c = PipelineConfig::default();
    c.retry.max_retries = 0;
    c.retry.initial_delay_ms = Duration::from_millis(1);
    c.circuit_breaker.volume_threshold = 3;
    c.circuit_breaker.rolling_count_timeout_ms = Duration::from_secs(60);
    c.circuit_breaker.reset_timeout_ms = Duration::from_secs(60);
    c
}

#[tokio::test]
async fn breaker_opens_after_threshold_failures_and_serves_stale_fallback() {
    let pipeline: resilient_client::Pipeline<i32> = resilient_client::Pipeline::new(&config());
    let endpoint = EndpointKey::new("quote");

    pipeline
        .execute(&Fingerprint::new("quote:WARM"), &endpoint, || async { Ok::<i32, RawUpstreamError>(42) })
        .await
        .unwrap();

    for i in 0..3 {
        let fp = Fingerprint::new(format!("quote:FAIL{i}"));
        let result = pipeline
            .execute(&fp, &endpoint, || async { Err::<i32, _>(RawUpstreamError::new("connection refused")) })
            .await;
        assert!(result.is_err());
    }

    let stats = pipeline.get_stats(&endpoint).await;
    assert_eq!(stats.circuit_breaker.state, resilient_client::CircuitState::Open);

    let result = pipeline
        .execute(&Fingerprint::new("quote:NEW"), &endpoint, || async { Ok::<i32, RawUpstreamError>(99) })
        .await;
    assert_eq!(result.unwrap(), 42, "an open circuit should fall back to the last known-good value");
}

#[tokio::test]
async fn breaker_with_no_prior_success_propagates_circuit_open() {
    let pipeline: resilient_client::Pipeline<i32> = resilient_client::Pipeline::new(&config());
    let endpoint = EndpointKey::new("news");

    for i in 0..3 {
        let fp = Fingerprint::new(format!("news:FAIL{i}"));
        let _ = pipeline
            .execute(&fp, &endpoint, || async { Err::<i32, _>(RawUpstreamError::new("connection refused")) })
            .await;
    }

    let result = pipeline
        .execute(&Fingerprint::new("news:NEW"), &endpoint, || async { Ok::<i32, RawUpstreamError>(1) })
        .await;
    assert!(matches!(result, Err(resilient_client::PipelineError::CircuitOpen)));
}
