//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache.
//!
//! # Tasks
//! - TTL Cleanup: sweeps expired cache entries at the configured interval

mod cleanup;

pub use cleanup::CleanupScheduler;
