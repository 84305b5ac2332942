//! Two-tier run cache with per-user isolation.
//!
//! Runs are split between a fast in-memory tier and a durable on-disk tier by
//! a pure classification of `(status, created_at, now)`. The split is never
//! stored: every access classifies again, so a run that was fresh an hour ago
//! moves to disk on its own once it crosses the staleness threshold.
//!
//! # Tenant Isolation
//!
//! Every durable path is rooted under a [`UserNamespace`](runboard_core::UserNamespace)
//! derived from the user id. Two caches built for different users never share
//! a directory.
//!
//! # Example
//!
//! ```ignore
//! let cache = TieredCache::new(Some(user_id), &CacheConfig::from_env());
//!
//! // Routed by classification
//! cache.set_run(&run)?;
//!
//! // Reads both tiers concurrently and merges them
//! let runs = cache.get_runs().await.unwrap_or_default();
//!
//! cache.close();
//! ```

pub mod durable;
pub mod ephemeral;
pub mod freshness;
pub mod layout;
pub mod tiered;
pub mod traits;

pub use durable::DurableStore;
pub use ephemeral::EphemeralStore;
pub use freshness::Stamped;
pub use layout::{run_file_name, CacheLayout};
pub use tiered::{order_runs, TieredCache};
pub use traits::{CacheStats, RunTier};
