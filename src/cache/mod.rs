//! In-memory TTL cache in front of the upstream catalog.
//!
//! Entries are keyed by the absolute request URL and live for a uniform TTL.
//! Concurrent misses on the same key both reach the upstream; there is no
//! request coalescing. A periodic sweep drops expired entries, logs hit/miss
//! statistics and resets the counters.

mod config;
mod store;
mod sweeper;

pub use config::CacheConfig;
pub use store::{CacheSource, CacheStats, ResponseCache, SweepReport};
pub use sweeper::run_sweeper;
