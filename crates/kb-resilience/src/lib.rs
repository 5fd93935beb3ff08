//! Pure-logic fault tolerance primitives used to wrap every call this workspace
//! makes to an external backend (vector index, text index, spider gateway, LLM
//! provider). No storage or network knowledge lives here.

pub mod circuit_breaker;
pub mod error;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::ResilienceError;
