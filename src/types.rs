//! Shared identifier newtypes (SPEC_FULL §3).

use std::fmt;

/// Canonical identifier of a logical request: `(endpoint-key, normalized arguments)`. Opaque
/// to the pipeline, supplied by the caller, and used verbatim as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifies the upstream endpoint a logical request targets (e.g. `"quote"`,
/// `"historical"`), used to key per-endpoint rate-limit and circuit-breaker state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey(String);

impl EndpointKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EndpointKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EndpointKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
