//! Cache configuration.
//!
//! Every knob has a default; `from_env()` overrides them from
//! `RUNBOARD_CACHE_*` variables and the builder methods override them in code.

use crate::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides the cache root directory.
pub const CACHE_DIR_ENV: &str = "RUNBOARD_CACHE_DIR";

/// Directory created under the platform cache dir when no override is set.
pub const CACHE_DIR_NAME: &str = "runboard";

pub const DEFAULT_RUN_TTL_SECS: u64 = 5 * 60;
pub const DEFAULT_FORM_DRAFT_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_DASHBOARD_TTL_SECS: u64 = 2 * 60;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Configuration for the tiered run cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Explicit cache root. Takes precedence over `RUNBOARD_CACHE_DIR`.
    pub cache_root: Option<PathBuf>,
    /// How long a fresh, non-terminal run stays in memory.
    pub run_ttl: Duration,
    /// How long form drafts survive; roughly one working session.
    pub form_draft_ttl: Duration,
    /// How long a dashboard snapshot may be served before recomputation.
    pub dashboard_ttl: Duration,
    /// Interval of the ephemeral store's background expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: None,
            run_ttl: Duration::from_secs(DEFAULT_RUN_TTL_SECS),
            form_draft_ttl: Duration::from_secs(DEFAULT_FORM_DRAFT_TTL_SECS),
            dashboard_ttl: Duration::from_secs(DEFAULT_DASHBOARD_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a CacheConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `RUNBOARD_CACHE_DIR`: cache root (default: platform cache dir)
    /// - `RUNBOARD_CACHE_RUN_TTL_SECS`: run TTL (default: 300)
    /// - `RUNBOARD_CACHE_FORM_TTL_SECS`: form draft TTL (default: 1800)
    /// - `RUNBOARD_CACHE_DASHBOARD_TTL_SECS`: dashboard snapshot TTL (default: 120)
    /// - `RUNBOARD_CACHE_SWEEP_SECS`: expiry sweep interval (default: 60)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let cache_root = std::env::var(CACHE_DIR_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            cache_root,
            run_ttl: secs_from_env("RUNBOARD_CACHE_RUN_TTL_SECS", DEFAULT_RUN_TTL_SECS),
            form_draft_ttl: secs_from_env("RUNBOARD_CACHE_FORM_TTL_SECS", DEFAULT_FORM_DRAFT_TTL_SECS),
            dashboard_ttl: secs_from_env(
                "RUNBOARD_CACHE_DASHBOARD_TTL_SECS",
                DEFAULT_DASHBOARD_TTL_SECS,
            ),
            sweep_interval: secs_from_env("RUNBOARD_CACHE_SWEEP_SECS", DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }

    /// Set the cache root explicitly.
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    /// Set the run TTL.
    pub fn with_run_ttl(mut self, ttl: Duration) -> Self {
        self.run_ttl = ttl;
        self
    }

    /// Set the form draft TTL.
    pub fn with_form_draft_ttl(mut self, ttl: Duration) -> Self {
        self.form_draft_ttl = ttl;
        self
    }

    /// Set the dashboard snapshot TTL.
    pub fn with_dashboard_ttl(mut self, ttl: Duration) -> Self {
        self.dashboard_ttl = ttl;
        self
    }

    /// Set the background sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(root) = &self.cache_root {
            if root.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "cache_root".to_string(),
                    value: String::new(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        let durations = [
            ("run_ttl", self.run_ttl),
            ("form_draft_ttl", self.form_draft_ttl),
            ("dashboard_ttl", self.dashboard_ttl),
            ("sweep_interval", self.sweep_interval),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0".to_string(),
                    reason: "must be > 0".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Resolve the cache root.
    ///
    /// Order: explicit `cache_root`, then `RUNBOARD_CACHE_DIR`, then
    /// `<platform cache dir>/runboard`.
    pub fn resolve_cache_root(&self) -> Result<PathBuf, ConfigError> {
        if let Some(root) = &self.cache_root {
            return Ok(root.clone());
        }
        if let Some(root) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(root));
        }
        dirs::cache_dir()
            .map(|dir| dir.join(CACHE_DIR_NAME))
            .ok_or_else(|| ConfigError::MissingRequired {
                field: CACHE_DIR_ENV.to_string(),
            })
    }
}

fn secs_from_env(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default),
    )
}
