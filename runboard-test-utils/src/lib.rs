//! runboard Test Utilities
//!
//! Shared test infrastructure for the runboard workspace:
//! - Proptest generators for runs and statuses
//! - Fixtures for runs at a given age and status
//! - A throwaway cache root for hermetic durable-store tests
//! - Custom assertions for runboard-specific validation

pub use runboard_core::{
    CacheConfig, ConfigError, RepositoryList, Run, RunStatus, RunboardError, RunboardResult,
    StorageError, StoreTier, Timestamp, UserProfile,
};

use chrono::{Duration, Utc};
use std::path::Path;
use tempfile::TempDir;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating runboard entity types.

    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    /// Generate any run status.
    pub fn arb_run_status() -> impl Strategy<Value = RunStatus> {
        prop::sample::select(RunStatus::ALL.to_vec())
    }

    /// Generate a non-terminal run status.
    pub fn arb_active_status() -> impl Strategy<Value = RunStatus> {
        prop::sample::select(
            RunStatus::ALL
                .iter()
                .copied()
                .filter(|status| !status.is_terminal())
                .collect::<Vec<_>>(),
        )
    }

    /// Generate a run id that is safe to use as a file name.
    pub fn arb_run_id() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9_-]{3,15}"
    }

    /// Generate a run age between zero and two days, in seconds.
    pub fn arb_age_secs() -> impl Strategy<Value = i64> {
        0i64..(2 * 24 * 3600)
    }

    /// Generate a run created `age` seconds before now.
    pub fn arb_run() -> impl Strategy<Value = Run> {
        (arb_run_id(), arb_run_status(), arb_age_secs())
            .prop_map(|(id, status, age)| fixtures::run_aged(&id, status, Duration::seconds(age)))
    }

    /// Generate up to `max` runs with distinct ids.
    pub fn arb_runs(max: usize) -> impl Strategy<Value = Vec<Run>> {
        prop::collection::vec(arb_run(), 0..=max).prop_map(|runs| {
            let mut seen = HashSet::new();
            runs.into_iter()
                .filter(|run| seen.insert(run.id.clone()))
                .collect()
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// A run created `age` ago in repository `acme/app`.
    pub fn run_aged(id: &str, status: RunStatus, age: Duration) -> Run {
        let mut run = Run::new(id, status, "acme/app", Utc::now() - age);
        run.prompt = format!("prompt for {}", id);
        run
    }

    /// A processing run created one minute ago.
    pub fn fresh_run(id: &str) -> Run {
        run_aged(id, RunStatus::Processing, Duration::minutes(1))
    }

    /// A finished run created ten minutes ago.
    pub fn terminal_run(id: &str) -> Run {
        let mut run = run_aged(id, RunStatus::Done, Duration::minutes(10));
        run.result_url = Some(format!("https://runs.example.com/{}", id));
        run.updated_at = Utc::now();
        run
    }

    /// A failed run created ten minutes ago.
    pub fn failed_run(id: &str) -> Run {
        let mut run = run_aged(id, RunStatus::Failed, Duration::minutes(10));
        run.error = Some("process exited with status 1".to_string());
        run.updated_at = Utc::now();
        run
    }

    /// A processing run created three hours ago.
    pub fn stuck_run(id: &str) -> Run {
        run_aged(id, RunStatus::Processing, Duration::hours(3))
    }

    /// A profile with a small quota.
    pub fn test_profile() -> UserProfile {
        UserProfile {
            id: "user-1".to_string(),
            email: "dev@example.com".to_string(),
            display_name: "Dev".to_string(),
            quota: runboard_core::Quota { used: 3, limit: 10 },
        }
    }

    /// A fresh user id, unique per call.
    pub fn new_user_id() -> String {
        uuid::Uuid::now_v7().to_string()
    }
}

// ============================================================================
// HERMETIC CACHE ROOT
// ============================================================================

/// A temporary cache root, removed on drop.
#[derive(Debug)]
pub struct TestCacheRoot {
    dir: TempDir,
}

impl TestCacheRoot {
    pub fn new() -> Self {
        let dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => panic!("failed to create temp cache root: {}", err),
        };
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Default config rooted here.
    pub fn config(&self) -> CacheConfig {
        CacheConfig::default().with_cache_root(self.dir.path())
    }
}

impl Default for TestCacheRoot {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for runboard-specific validation.

    use super::*;

    /// Assert that a RunboardResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &RunboardResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a RunboardResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &RunboardResult<T>) {
        match result {
            Err(RunboardError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a RunboardResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &RunboardResult<T>) {
        match result {
            Err(RunboardError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert newest-first order by `created_at`, ties broken by ascending id.
    #[track_caller]
    pub fn assert_runs_ordered(runs: &[Run]) {
        for pair in runs.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let ordered = a.created_at > b.created_at
                || (a.created_at == b.created_at && a.id < b.id);
            assert!(
                ordered,
                "Runs out of order: {} ({}) before {} ({})",
                a.id, a.created_at, b.id, b.created_at
            );
        }
    }

    /// Assert every `.json` document in `dir` parses as a `Run`.
    /// A missing directory counts as empty.
    #[track_caller]
    pub fn assert_run_files_parse(dir: &Path) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => panic!("Cannot read {}: {}", dir.display(), err),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                // Removed concurrently by a self-healing read.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => panic!("Cannot read {}: {}", path.display(), err),
            };
            if let Err(err) = serde_json::from_slice::<Run>(&bytes) {
                panic!("{} does not parse as a run: {}", path.display(), err);
            }
        }
    }
}
