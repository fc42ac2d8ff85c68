//! Canonical error taxonomy for the resilience pipeline: a domain-specific `ErrorKind` and
//! `ClassifiedError` produced by the classifier, and the top-level `PipelineError` returned
//! from [`crate::pipeline::Pipeline::execute`].

use std::time::Duration;

/// An attempt made by the retry loop, recorded for `MaxRetriesExceeded`.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub attempt: usize,
    pub delay: Duration,
    pub error: ClassifiedError,
    pub timestamp: std::time::Instant,
}

/// Canonical error kind, independent of how the failure surfaced (status code, transport
/// error, or explicit upstream message).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    RateLimit,
    CircuitOpen,
    MaxRetriesExceeded,
    Timeout,
    Network,
    Server,
    SymbolNotFound,
    CookieSession,
    DataUnavailable,
    PartialData,
    ApiChanged,
    CacheStale,
    Unknown,
}

impl ErrorKind {
    /// Whether the pipeline should consider retrying a failure of this kind, absent any
    /// more specific override (e.g. a `skip_retry` predicate).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit
                | ErrorKind::Timeout
                | ErrorKind::Network
                | ErrorKind::Server
                | ErrorKind::CookieSession
                | ErrorKind::Unknown
        )
    }

    pub fn is_rate_limit(self) -> bool {
        matches!(self, ErrorKind::RateLimit)
    }
}

/// A classified error: the output of [`crate::classifier::classify`].
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub upstream_status: Option<u16>,
    pub retry_after: Option<Duration>,
    pub suggested_action: String,
}

impl ClassifiedError {
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind.is_rate_limit()
    }

    /// Is this a transient 5xx (502/503/504), per the retry delay table in §4.4.
    pub fn is_transient_server(&self) -> bool {
        matches!(self.kind, ErrorKind::Server)
            && matches!(self.upstream_status, Some(502) | Some(503) | Some(504))
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ClassifiedError {}

/// Top-level error returned by [`crate::pipeline::Pipeline::execute`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimit { retry_after: Option<Duration> },

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("max retries exceeded after {} attempts", history.len())]
    MaxRetriesExceeded { history: Vec<AttemptRecord> },

    #[error("upstream call timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream server error (status {status}, transient={transient})")]
    Server { status: u16, transient: bool },

    #[error("symbol not found")]
    SymbolNotFound,

    #[error("cookie/session error")]
    CookieSession,

    #[error("data unavailable")]
    DataUnavailable,

    #[error("partial data")]
    PartialData,

    #[error("upstream API appears to have changed shape")]
    ApiChanged,

    #[error("cache entry is stale")]
    CacheStale,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::RateLimit { .. } => ErrorKind::RateLimit,
            PipelineError::CircuitOpen => ErrorKind::CircuitOpen,
            PipelineError::MaxRetriesExceeded { .. } => ErrorKind::MaxRetriesExceeded,
            PipelineError::Timeout => ErrorKind::Timeout,
            PipelineError::Network(_) => ErrorKind::Network,
            PipelineError::Server { .. } => ErrorKind::Server,
            PipelineError::SymbolNotFound => ErrorKind::SymbolNotFound,
            PipelineError::CookieSession => ErrorKind::CookieSession,
            PipelineError::DataUnavailable => ErrorKind::DataUnavailable,
            PipelineError::PartialData => ErrorKind::PartialData,
            PipelineError::ApiChanged => ErrorKind::ApiChanged,
            PipelineError::CacheStale => ErrorKind::CacheStale,
            PipelineError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn from_classified(err: ClassifiedError) -> Self {
        match err.kind {
            ErrorKind::RateLimit => PipelineError::RateLimit {
                retry_after: err.retry_after,
            },
            ErrorKind::CircuitOpen => PipelineError::CircuitOpen,
            ErrorKind::MaxRetriesExceeded => PipelineError::MaxRetriesExceeded { history: vec![] },
            ErrorKind::Timeout => PipelineError::Timeout,
            ErrorKind::Network => PipelineError::Network(err.message),
            ErrorKind::Server => PipelineError::Server {
                status: err.upstream_status.unwrap_or(0),
                transient: err.is_transient_server(),
            },
            ErrorKind::SymbolNotFound => PipelineError::SymbolNotFound,
            ErrorKind::CookieSession => PipelineError::CookieSession,
            ErrorKind::DataUnavailable => PipelineError::DataUnavailable,
            ErrorKind::PartialData => PipelineError::PartialData,
            ErrorKind::ApiChanged => PipelineError::ApiChanged,
            ErrorKind::CacheStale => PipelineError::CacheStale,
            ErrorKind::Unknown => PipelineError::Unknown(err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_match_spec_taxonomy() {
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Server.is_retryable());
        assert!(ErrorKind::CookieSession.is_retryable());
        assert!(ErrorKind::Unknown.is_retryable());

        assert!(!ErrorKind::CircuitOpen.is_retryable());
        assert!(!ErrorKind::SymbolNotFound.is_retryable());
        assert!(!ErrorKind::DataUnavailable.is_retryable());
        assert!(!ErrorKind::PartialData.is_retryable());
        assert!(!ErrorKind::ApiChanged.is_retryable());
        assert!(!ErrorKind::CacheStale.is_retryable());
    }

    #[test]
    fn transient_server_requires_5xx_status() {
        let err = ClassifiedError {
            kind: ErrorKind::Server,
            message: "bad gateway".into(),
            upstream_status: Some(502),
            retry_after: None,
            suggested_action: "retry".into(),
        };
        assert!(err.is_transient_server());

        let err = ClassifiedError {
            upstream_status: Some(500),
            ..err
        };
        assert!(!err.is_transient_server());
    }
}
