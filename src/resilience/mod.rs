//! Node failure handling for the remote tier.

pub mod circuit_breaker;
