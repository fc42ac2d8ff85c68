//! End-to-end happy path: a successful call is served once, then cached.

use resilient_client::{EndpointKey, Fingerprint, PipelineConfig, RawUpstreamError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn config() -> PipelineConfig {
    let mut c = PipelineConfig::default();
    c.retry.max_retries = 1;
    c.retry.initial_delay_ms = std::time::Duration::from_millis(1);
    c.retry.jitter = false;
    c
}

#[tokio::test]
async fn second_call_for_the_same_fingerprint_is_a_cache_hit() {
    let pipeline: resilient_client::Pipeline<String> = resilient_client::Pipeline::new(&config());
    let endpoint = EndpointKey::new("quote");
    let fp = Fingerprint::new("quote:AAPL");
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let calls = Arc::clone(&calls);
        let result = pipeline
            .execute(&fp, &endpoint, move || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<String, RawUpstreamError>("quote-data".to_string())
                }
            })
            .await;
        assert_eq!(result.unwrap(), "quote-data");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1, "only the first call should have reached produce()");
}

#[tokio::test]
async fn distinct_fingerprints_are_independent_cache_entries() {
    let pipeline: resilient_client::Pipeline<i32> = resilient_client::Pipeline::new(&config());
    let endpoint = EndpointKey::new("quote");

    let a = pipeline
        .execute(&Fingerprint::new("quote:AAPL"), &endpoint, || async { Ok::<i32, RawUpstreamError>(1) })
        .await
        .unwrap();
    let b = pipeline
        .execute(&Fingerprint::new("quote:MSFT"), &endpoint, || async { Ok::<i32, RawUpstreamError>(2) })
        .await
        .unwrap();

    assert_eq!(a, 1);
    assert_eq!(b, 2);
}

#[tokio::test]
async fn not_retryable_errors_propagate_without_exhausting_retries() {
    let pipeline: resilient_client::Pipeline<i32> = resilient_client::Pipeline::new(&config());
    let endpoint = EndpointKey::new("quote");
    let calls = Arc::new(AtomicU32::new(0));
    let calls2 = Arc::clone(&calls);

    let result = pipeline
        .execute(&Fingerprint::new("quote:MISSING"), &endpoint, move || {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(RawUpstreamError::new("symbol not found").with_status(404))
            }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1, "a non-retryable error must not be retried");
}
