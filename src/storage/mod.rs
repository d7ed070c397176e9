//! Remote tier backends.
//!
//! - [`traits`]: the [`traits::RemoteCache`] seam and its error type
//! - [`redis`]: weighted Redis node pools
//! - [`memory`]: in-process pool for tests and local development

pub mod traits;
pub mod redis;
pub mod memory;
