use thiserror::Error;

/// Errors a `CircuitBreaker`-wrapped call can fail with. A caller's own adapter
/// error converts into one of these at the call site, classifying itself the way
/// `kb_core::ErrorKind` does.
#[derive(Debug, Error, Clone)]
pub enum ResilienceError {
    #[error("circuit is open")]
    CircuitOpen,
    #[error("transient: {0}")]
    Transient(String),
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ResilienceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Whether this failure should count against the breaker's trip threshold.
    /// A permanent error is the caller's fault, not the backend's health.
    pub fn should_trip_breaker(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}
