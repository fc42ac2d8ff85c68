//! Maps raw upstream failures into a [`ClassifiedError`] via a priority-ordered
//! keyword/status cascade.

use crate::error::{ClassifiedError, ErrorKind};
use std::collections::HashMap;
use std::time::Duration;

/// A raw failure as reported by the work function (`produce`), before classification.
///
/// The upstream wire format is out of scope for this crate; callers attach whatever
/// headers and status they observed so the classifier can extract `retry-after` and the
/// `x-ratelimit-*` signals described in SPEC_FULL §6.
#[derive(Debug, Clone, Default)]
pub struct RawUpstreamError {
    pub message: String,
    pub status: Option<u16>,
    pub headers: HashMap<String, String>,
}

impl RawUpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            headers: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Classify a raw upstream failure using the priority-ordered heuristics in SPEC_FULL §4.5.
pub fn classify(raw: &RawUpstreamError) -> ClassifiedError {
    let msg = raw.message.as_str();
    let retry_after = raw.retry_after();

    let (kind, suggested_action) = if contains_any(msg, &["crumb", "csrf", "cookie", "session"]) {
        (ErrorKind::CookieSession, "refresh session/crumb and retry")
    } else if raw.status == Some(429) || contains_any(msg, &["rate limit"]) {
        (ErrorKind::RateLimit, "back off and retry after the suggested delay")
    } else if raw.status == Some(404) || contains_any(msg, &["symbol not found", "no data found"]) {
        (ErrorKind::SymbolNotFound, "verify the symbol exists")
    } else if matches!(raw.status, Some(500..=599)) {
        (ErrorKind::Server, "retry with backoff; upstream is degraded")
    } else if contains_any(msg, &["timeout", "timed out", "etimedout"]) {
        (ErrorKind::Timeout, "retry with a longer deadline")
    } else if contains_any(
        msg,
        &["econnreset", "etimedout", "enotfound", "econnrefused", "connection"],
    ) {
        (ErrorKind::Network, "retry; check upstream connectivity")
    } else if contains_any(msg, &["api changed", "unexpected structure"]) {
        (ErrorKind::ApiChanged, "upstream payload shape drifted; update the parser")
    } else if contains_any(msg, &["data unavailable"]) {
        (ErrorKind::DataUnavailable, "no data available for this request")
    } else if contains_any(msg, &["incomplete", "partial"]) {
        (ErrorKind::PartialData, "response is missing fields")
    } else if contains_any(msg, &["circuit open"]) {
        (ErrorKind::CircuitOpen, "upstream is circuit-broken; wait for recovery")
    } else if contains_any(msg, &["stale cache"]) {
        (ErrorKind::CacheStale, "serving stale data")
    } else if contains_any(msg, &["null", "undefined"]) {
        (ErrorKind::DataUnavailable, "no data available for this request")
    } else {
        (ErrorKind::Unknown, "retry as a last resort")
    };

    ClassifiedError {
        kind,
        message: raw.message.clone(),
        upstream_status: raw.status,
        retry_after,
        suggested_action: suggested_action.to_string(),
    }
}
