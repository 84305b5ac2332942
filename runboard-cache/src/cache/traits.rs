//! Tier trait and cache statistics.

use runboard_core::{Run, RunboardResult, StoreTier};

/// One tier of the run cache.
///
/// Both stores implement this so the orchestrator can fan out over them
/// uniformly. Implementations are internally synchronized and may be called
/// from any thread.
///
/// # Implementation Requirements
///
/// - `put_run` must silently skip runs that do not belong in `tier()` at the
///   time of the call.
/// - `all_runs` must only return runs that still belong in `tier()` now, and
///   returns `None` when the tier holds nothing at all.
/// - `remove_run` of an absent id is not an error.
pub trait RunTier: Send + Sync {
    /// Which tier this store serves.
    fn tier(&self) -> StoreTier;

    fn get_run(&self, id: &str) -> RunboardResult<Option<Run>>;

    fn put_run(&self, run: &Run) -> RunboardResult<()>;

    fn all_runs(&self) -> RunboardResult<Option<Vec<Run>>>;

    fn remove_run(&self, id: &str) -> RunboardResult<()>;

    /// Number of run records currently held. Computed on demand.
    fn run_count(&self) -> RunboardResult<usize>;
}

/// Point-in-time counts across both tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Runs persisted on disk for this user.
    pub durable_count: usize,
    /// Runs held in memory.
    pub ephemeral_count: usize,
    /// Entries in the persisted repository list.
    pub repository_count: usize,
}

impl CacheStats {
    /// Total runs across both tiers.
    pub fn total_runs(&self) -> usize {
        self.durable_count + self.ephemeral_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_runs() {
        let stats = CacheStats {
            durable_count: 3,
            ephemeral_count: 2,
            repository_count: 9,
        };
        assert_eq!(stats.total_runs(), 5);
        assert_eq!(CacheStats::default().total_runs(), 0);
    }
}
