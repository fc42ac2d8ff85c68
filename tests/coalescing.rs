//! Concurrent callers for the same fingerprint must coalesce onto a single upstream call.

use resilient_client::{EndpointKey, Fingerprint, PipelineConfig, RawUpstreamError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config() -> PipelineConfig {
    let mut c = PipelineConfig::default();
    c.retry.max_retries = 1;
    c.retry.initial_delay_ms = Duration::from_millis(1);
    c.retry.jitter = false;
    c.cache.max_entries = 100;
    c
}

#[tokio::test]
async fn ten_concurrent_misses_produce_exactly_one_upstream_call() {
    let pipeline: Arc<resilient_client::Pipeline<i32>> = Arc::new(resilient_client::Pipeline::new(&config()));
    let endpoint = EndpointKey::new("quote");
    let fp = Fingerprint::new("quote:AAPL");
    let calls = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pipeline = Arc::clone(&pipeline);
        let fp = fp.clone();
        let endpoint = endpoint.clone();
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            pipeline
                .execute(&fp, &endpoint, move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<i32, RawUpstreamError>(7)
                    }
                })
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 7);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1, "only one caller should have reached produce()");
}
