//! Entity types cached by runboard

use crate::{classify, RunStatus, StoreTier, Timestamp};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A remotely-executed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    /// Repository identity, e.g. `owner/name`.
    pub repository: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Link to the produced result (pull request, artifact) once terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fingerprint of the file set the run was started from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
}

impl Run {
    /// Minimal run with the required fields; `updated_at` starts equal to `created_at`.
    pub fn new(
        id: impl Into<String>,
        status: RunStatus,
        repository: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            status,
            repository: repository.into(),
            created_at,
            updated_at: created_at,
            prompt: String::new(),
            title: None,
            context: None,
            result_url: None,
            error: None,
            file_hash: None,
        }
    }

    /// Tier this run belongs in at `now`.
    pub fn tier_at(&self, now: Timestamp) -> StoreTier {
        classify(self.status, self.created_at, now)
    }

    /// Tier this run belongs in right now.
    pub fn tier(&self) -> StoreTier {
        self.tier_at(Utc::now())
    }

    pub fn is_durable_eligible(&self, now: Timestamp) -> bool {
        self.tier_at(now).is_durable()
    }

    /// Age relative to `now`, clamped at zero.
    pub fn age_at(&self, now: Timestamp) -> Duration {
        let age = now.signed_duration_since(self.created_at);
        if age < Duration::zero() {
            Duration::zero()
        } else {
            age
        }
    }
}

/// Usage counters reported by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub used: u64,
    pub limit: u64,
}

impl Quota {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }
}

/// The authenticated user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub quota: Quota,
}

/// Mapping from file path to content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHashRecord {
    hashes: BTreeMap<String, String>,
}

impl FileHashRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.hashes.get(path).map(String::as_str)
    }

    /// Insert or replace the hash for `path`, returning the previous value.
    pub fn insert(&mut self, path: impl Into<String>, hash: impl Into<String>) -> Option<String> {
        self.hashes.insert(path.into(), hash.into())
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.hashes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.hashes
    }
}

impl FromIterator<(String, String)> for FileHashRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            hashes: iter.into_iter().collect(),
        }
    }
}

/// Repositories the user has worked with, most-recently-used first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryList {
    repositories: Vec<String>,
    pub updated_at: Timestamp,
}

impl RepositoryList {
    /// Build a list from an iterator, dropping later duplicates.
    pub fn new<I, S>(repositories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self {
            repositories: Vec::new(),
            updated_at: Utc::now(),
        };
        for repo in repositories {
            let repo = repo.into();
            if !list.repositories.contains(&repo) {
                list.repositories.push(repo);
            }
        }
        list
    }

    /// Move `repo` to the front, inserting it if absent.
    pub fn touch(&mut self, repo: impl Into<String>) {
        let repo = repo.into();
        self.repositories.retain(|r| *r != repo);
        self.repositories.insert(0, repo);
        self.updated_at = Utc::now();
    }

    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }

    pub fn most_recent(&self) -> Option<&str> {
        self.repositories.first().map(String::as_str)
    }

    pub fn contains(&self, repo: &str) -> bool {
        self.repositories.iter().any(|r| r == repo)
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

impl Default for RepositoryList {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

/// The repository selected last, with when it was selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastUsedRepository {
    pub repository: String,
    pub updated_at: Timestamp,
}

impl LastUsedRepository {
    pub fn now(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Uninterpreted form state kept between screens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormDraft {
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl FormDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }
}

/// Everything the dashboard renders in one frame. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub runs: Vec<Run>,
    pub profile: Option<UserProfile>,
    pub repositories: RepositoryList,
    pub captured_at: Timestamp,
}

impl DashboardSnapshot {
    pub fn new(runs: Vec<Run>, profile: Option<UserProfile>, repositories: RepositoryList) -> Self {
        Self {
            runs,
            profile,
            repositories,
            captured_at: Utc::now(),
        }
    }
}
