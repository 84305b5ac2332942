//! runboard Cache - Local Run Cache
//!
//! Local cache for the runboard terminal dashboard. Fresh, active runs live
//! in a TTL memory table; finished and stuck runs are persisted as one JSON
//! document per run under a per-user cache directory.
//!
//! The entity types live in runboard-core.

pub mod cache;

// Re-export cache types for the dashboard
pub use cache::{
    order_runs, run_file_name, CacheLayout, CacheStats, DurableStore, EphemeralStore, RunTier,
    Stamped, TieredCache,
};
