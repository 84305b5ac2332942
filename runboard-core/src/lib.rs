//! runboard Core - Entity Types
//!
//! Plain data structures shared by the cache crates: runs and their status,
//! user profile, repository lists, UI drafts and dashboard snapshots, plus the
//! pure `classify` function that decides which cache tier a run belongs in.

use chrono::{DateTime, Utc};

mod classify;
mod config;
mod entities;
mod enums;
mod error;
mod identity;

pub use classify::{classify, staleness_threshold, STALENESS_THRESHOLD_SECS};
pub use config::{
    CacheConfig, CACHE_DIR_ENV, CACHE_DIR_NAME, DEFAULT_DASHBOARD_TTL_SECS,
    DEFAULT_FORM_DRAFT_TTL_SECS, DEFAULT_RUN_TTL_SECS, DEFAULT_SWEEP_INTERVAL_SECS,
};
pub use entities::{
    DashboardSnapshot, FileHashRecord, FormDraft, LastUsedRepository, Quota, RepositoryList, Run,
    UserProfile,
};
pub use enums::{RunStatus, StoreTier};
pub use error::{ConfigError, RunboardError, RunboardResult, StorageError};
pub use identity::{sha256_hex, UserNamespace, ANONYMOUS_NAMESPACE};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
