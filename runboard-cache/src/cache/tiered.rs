//! Two-tier run cache used by the dashboard.
//!
//! `TieredCache` is the only type callers need. It classifies every run on
//! access and routes it to exactly one tier:
//!
//! - fresh, non-terminal runs go to the [`EphemeralStore`];
//! - terminal runs, and non-terminal runs older than the staleness threshold,
//!   go to the [`DurableStore`].
//!
//! Whole-file entities (profile, file hashes, repositories) live only in the
//! durable tier; the dashboard snapshot and form drafts live only in memory.
//!
//! If the durable store cannot be opened the cache runs ephemeral-only: every
//! durable read reports a miss and every durable write succeeds without effect.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use runboard_core::{
    CacheConfig, DashboardSnapshot, FileHashRecord, FormDraft, LastUsedRepository, RepositoryList,
    Run, RunboardResult, StorageError, StoreTier, UserNamespace, UserProfile,
};
use tokio::task::JoinSet;

use super::durable::DurableStore;
use super::ephemeral::EphemeralStore;
use super::layout::CacheLayout;
use super::traits::{CacheStats, RunTier};

type MergedRuns = HashMap<String, (Run, StoreTier)>;

/// Per-user two-tier run cache.
///
/// Construct one per authenticated user and pass it to whoever needs it.
/// Switching users means building a new instance.
///
/// # Example
///
/// ```ignore
/// let cache = TieredCache::new(Some("user-42"), &CacheConfig::from_env());
/// cache.set_run(&run)?;
/// if let Some(runs) = cache.get_runs().await {
///     render(&runs);
/// }
/// cache.close();
/// ```
#[derive(Debug)]
pub struct TieredCache {
    namespace: UserNamespace,
    durable: Option<Arc<DurableStore>>,
    ephemeral: Arc<EphemeralStore>,
}

impl TieredCache {
    /// Build the cache for `user_id`. `None` or a blank id uses the shared
    /// anonymous namespace.
    ///
    /// Never fails: if the durable store cannot be opened the cache degrades
    /// to ephemeral-only and logs why.
    pub fn new(user_id: Option<&str>, config: &CacheConfig) -> Self {
        if let Err(err) = config.validate() {
            tracing::warn!(error = %err, "Cache configuration is invalid; continuing with it as given");
        }

        let namespace = UserNamespace::for_user(user_id);
        let durable = match open_durable(&namespace, config) {
            Ok(store) => {
                tracing::debug!(
                    namespace = %namespace,
                    path = %store.layout().user_dir().display(),
                    "Durable run cache opened"
                );
                Some(Arc::new(store))
            }
            Err(err) => {
                tracing::warn!(
                    namespace = %namespace,
                    error = %err,
                    "Durable run cache unavailable; running ephemeral-only"
                );
                None
            }
        };

        Self {
            namespace,
            durable,
            ephemeral: Arc::new(EphemeralStore::new(config)),
        }
    }

    /// Build the cache with configuration read from the environment.
    pub fn with_defaults(user_id: Option<&str>) -> Self {
        Self::new(user_id, &CacheConfig::from_env())
    }

    pub fn namespace(&self) -> &UserNamespace {
        &self.namespace
    }

    /// True if a durable store backs this cache.
    pub fn is_persistent(&self) -> bool {
        self.durable.is_some()
    }

    /// On-disk layout of the durable tier, if there is one.
    pub fn durable_layout(&self) -> Option<&CacheLayout> {
        self.durable.as_deref().map(DurableStore::layout)
    }

    // ========================================================================
    // RUNS
    // ========================================================================

    /// Look up a run, durable tier first. The first hit wins.
    pub fn get_run(&self, id: &str) -> Option<Run> {
        if let Some(run) = self.read_durable("run", |durable| durable.get_run(id)) {
            return Some(run);
        }
        self.ephemeral.get(id)
    }

    /// Store a run in the one tier it classifies into right now.
    ///
    /// When the run goes to disk, an in-memory copy of the same id that is
    /// no newer is dropped in the background. When it goes to memory, any
    /// copy on disk is removed so the durable-first lookup cannot shadow it.
    pub fn set_run(&self, run: &Run) -> RunboardResult<()> {
        match run.tier_at(Utc::now()) {
            StoreTier::Durable => {
                self.write_durable(|durable| durable.set_run(run))?;
                self.discard_ephemeral_copy(run);
            }
            StoreTier::Ephemeral => {
                self.ephemeral.set(run);
                self.discard_durable_copy(&run.id);
            }
        }
        Ok(())
    }

    /// Every cached run from both tiers, newest first.
    ///
    /// Both tiers are read concurrently. When both hold the same id the copy
    /// with the later `updated_at` wins; on a tie the in-memory copy wins.
    /// Equal creation times are ordered by id. Returns `None` if neither tier
    /// holds anything.
    pub async fn get_runs(&self) -> Option<Vec<Run>> {
        let merged: Arc<Mutex<MergedRuns>> = Arc::new(Mutex::new(HashMap::new()));
        let mut tasks = JoinSet::new();

        for tier in self.tiers() {
            let merged = Arc::clone(&merged);
            let namespace = self.namespace.clone();
            tasks.spawn_blocking(move || match tier.all_runs() {
                Ok(Some(runs)) => {
                    let mut map = lock_merged(&merged);
                    for run in runs {
                        merge_run(&mut map, run, tier.tier());
                    }
                    true
                }
                Ok(None) => false,
                Err(err) => {
                    tracing::warn!(
                        namespace = %namespace,
                        tier = %tier.tier(),
                        error = %err,
                        "Run listing failed"
                    );
                    false
                }
            });
        }

        let mut found = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(tier_found) => found |= tier_found,
                Err(err) => tracing::warn!(error = %err, "Run listing task failed"),
            }
        }

        if !found {
            return None;
        }
        let map = std::mem::take(&mut *lock_merged(&merged));
        let mut runs: Vec<Run> = map.into_values().map(|(run, _)| run).collect();
        order_runs(&mut runs);
        Some(runs)
    }

    /// Store a batch of runs, writing both tiers concurrently.
    ///
    /// Each run is classified once against the same instant. Returns the
    /// first error either tier reported.
    pub async fn set_runs(&self, runs: Vec<Run>) -> RunboardResult<()> {
        let now = Utc::now();
        let (to_disk, to_memory): (Vec<Run>, Vec<Run>) =
            runs.into_iter().partition(|run| run.is_durable_eligible(now));

        let mut tasks: JoinSet<RunboardResult<()>> = JoinSet::new();

        if let Some(durable) = &self.durable {
            let durable = Arc::clone(durable);
            let batch = to_disk.clone();
            let moved_to_memory: Vec<String> = to_memory.iter().map(|run| run.id.clone()).collect();
            tasks.spawn_blocking(move || {
                durable.set_runs(&batch)?;
                for id in &moved_to_memory {
                    durable.invalidate_run(id)?;
                }
                Ok(())
            });
        }

        let ephemeral = Arc::clone(&self.ephemeral);
        tasks.spawn_blocking(move || {
            // Discards drop the "all runs" list, so they go before `set_all`.
            for run in &to_disk {
                ephemeral.discard_superseded(&run.id, run.updated_at);
            }
            ephemeral.set_all(&to_memory);
            Ok(())
        });

        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => Err(StorageError::Unavailable {
                    reason: format!("run write task failed: {}", err),
                }
                .into()),
            };
            if let Err(err) = outcome {
                tracing::warn!(namespace = %self.namespace, error = %err, "Batch run write failed");
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Remove a run from both tiers. Missing runs are ignored.
    pub fn invalidate_run(&self, id: &str) {
        self.ephemeral.invalidate_one(id);
        if let Some(durable) = &self.durable {
            if let Err(err) = durable.invalidate_run(id) {
                tracing::warn!(run_id = id, error = %err, "Durable run invalidation failed");
            }
        }
    }

    /// Drop every in-memory run. Persisted runs are untouched.
    pub fn invalidate_active_runs(&self) {
        self.ephemeral.invalidate_active();
    }

    // ========================================================================
    // PROFILE
    // ========================================================================

    pub fn get_user_profile(&self) -> Option<UserProfile> {
        self.read_durable("user profile", DurableStore::get_user_profile)
            .map(|stamped| stamped.into_value())
    }

    pub fn set_user_profile(&self, profile: &UserProfile) -> RunboardResult<()> {
        self.write_durable(|durable| durable.set_user_profile(profile))
    }

    /// How long ago the profile was stored, if one is stored.
    pub fn profile_age(&self) -> Option<Duration> {
        self.read_durable("user profile", DurableStore::get_user_profile)
            .map(|stamped| stamped.staleness())
    }

    /// True if a profile is stored and was stored no more than `max_age` ago.
    pub fn is_profile_fresh(&self, max_age: Duration) -> bool {
        self.profile_age().is_some_and(|age| age <= max_age)
    }

    // ========================================================================
    // FILE HASHES
    // ========================================================================

    pub fn get_file_hash(&self, file_path: &str) -> Option<String> {
        self.read_durable("file hash", |durable| durable.get_file_hash(file_path))
    }

    pub fn set_file_hash(&self, file_path: &str, hash: &str) -> RunboardResult<()> {
        self.write_durable(|durable| durable.set_file_hash(file_path, hash))
    }

    /// Every stored hash; empty when none are stored or the cache is degraded.
    pub fn get_all_file_hashes(&self) -> FileHashRecord {
        self.read_durable("file hashes", |durable| {
            durable.get_all_file_hashes().map(Some)
        })
        .unwrap_or_default()
    }

    // ========================================================================
    // REPOSITORIES
    // ========================================================================

    pub fn get_repository_list(&self) -> Option<RepositoryList> {
        self.read_durable("repository list", DurableStore::get_repository_list)
    }

    pub fn set_repository_list(&self, list: &RepositoryList) -> RunboardResult<()> {
        self.write_durable(|durable| durable.set_repository_list(list))
    }

    pub fn get_last_used_repository(&self) -> Option<LastUsedRepository> {
        self.read_durable("last used repository", DurableStore::get_last_used_repository)
    }

    pub fn set_last_used_repository(&self, repository: &str) -> RunboardResult<()> {
        let last = LastUsedRepository::now(repository);
        self.write_durable(|durable| durable.set_last_used_repository(&last))
    }

    /// Move `repository` to the front of the list and mark it last used.
    pub fn record_repository_use(&self, repository: &str) -> RunboardResult<()> {
        self.write_durable(|durable| durable.record_repository_use(repository))
    }

    // ========================================================================
    // UI STATE
    // ========================================================================

    pub fn get_dashboard_snapshot(&self) -> Option<DashboardSnapshot> {
        self.ephemeral.get_dashboard_snapshot()
    }

    pub fn set_dashboard_snapshot(&self, snapshot: DashboardSnapshot) {
        self.ephemeral.set_dashboard_snapshot(snapshot);
    }

    pub fn get_form_draft(&self) -> Option<FormDraft> {
        self.ephemeral.get_form_draft()
    }

    pub fn set_form_draft(&self, draft: FormDraft) {
        self.ephemeral.set_form_draft(draft);
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Counts computed now from both tiers.
    pub fn stats(&self) -> CacheStats {
        let durable_count = self
            .durable
            .as_deref()
            .map(|durable| {
                durable.run_count().unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "Durable run count failed");
                    0
                })
            })
            .unwrap_or(0);
        let repository_count = self
            .get_repository_list()
            .map(|list| list.len())
            .unwrap_or(0);

        CacheStats {
            durable_count,
            ephemeral_count: self.ephemeral.run_count(),
            repository_count,
        }
    }

    /// Wipe both tiers for this user.
    pub fn clear(&self) -> RunboardResult<()> {
        self.ephemeral.clear();
        self.write_durable(DurableStore::clear)
    }

    /// Stop background work. Safe to call more than once.
    pub fn close(&self) {
        self.ephemeral.stop();
        tracing::debug!(namespace = %self.namespace, "Run cache closed");
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn tiers(&self) -> Vec<Arc<dyn RunTier>> {
        let mut tiers: Vec<Arc<dyn RunTier>> = vec![Arc::clone(&self.ephemeral) as Arc<dyn RunTier>];
        if let Some(durable) = &self.durable {
            tiers.push(Arc::clone(durable) as Arc<dyn RunTier>);
        }
        tiers
    }

    /// Run a durable read; errors and degraded mode both report a miss.
    fn read_durable<T, F>(&self, entity: &'static str, read: F) -> Option<T>
    where
        F: FnOnce(&DurableStore) -> RunboardResult<Option<T>>,
    {
        let durable = self.durable.as_deref()?;
        match read(durable) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(namespace = %self.namespace, entity, error = %err, "Durable read failed");
                None
            }
        }
    }

    /// Run a durable write; a no-op in degraded mode.
    fn write_durable<F>(&self, write: F) -> RunboardResult<()>
    where
        F: FnOnce(&DurableStore) -> RunboardResult<()>,
    {
        match self.durable.as_deref() {
            Some(durable) => write(durable),
            None => Ok(()),
        }
    }

    /// Remove a persisted copy of a run that now lives in memory. Best effort.
    fn discard_durable_copy(&self, id: &str) {
        if let Some(durable) = &self.durable {
            if let Err(err) = durable.invalidate_run(id) {
                tracing::warn!(run_id = id, error = %err, "Removing outdated durable run failed");
            }
        }
    }

    /// Drop a superseded in-memory copy of `run`, in the background when a
    /// runtime is available. Best effort; may land after this call returns.
    fn discard_ephemeral_copy(&self, run: &Run) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let ephemeral = Arc::clone(&self.ephemeral);
                let id = run.id.clone();
                let updated_at = run.updated_at;
                runtime.spawn(async move {
                    ephemeral.discard_superseded(&id, updated_at);
                });
            }
            Err(_) => {
                self.ephemeral.discard_superseded(&run.id, run.updated_at);
            }
        }
    }
}

fn open_durable(namespace: &UserNamespace, config: &CacheConfig) -> RunboardResult<DurableStore> {
    let root = config.resolve_cache_root()?;
    if root.as_os_str().is_empty() {
        return Err(StorageError::Unavailable {
            reason: "cache root is empty".to_string(),
        }
        .into());
    }
    DurableStore::open(root, namespace.clone())
}

fn lock_merged(merged: &Mutex<MergedRuns>) -> MutexGuard<'_, MergedRuns> {
    match merged.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn merge_run(map: &mut MergedRuns, run: Run, tier: StoreTier) {
    match map.entry(run.id.clone()) {
        Entry::Vacant(slot) => {
            slot.insert((run, tier));
        }
        Entry::Occupied(mut slot) => {
            let (held, held_tier) = slot.get();
            if supersedes(&run, tier, held, *held_tier) {
                slot.insert((run, tier));
            }
        }
    }
}

/// True if `candidate` should replace `held` for the same id.
fn supersedes(candidate: &Run, candidate_tier: StoreTier, held: &Run, held_tier: StoreTier) -> bool {
    match candidate.updated_at.cmp(&held.updated_at) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => {
            candidate_tier == StoreTier::Ephemeral && held_tier == StoreTier::Durable
        }
    }
}

/// Sort runs newest first by `created_at`, then by id.
pub fn order_runs(runs: &mut [Run]) {
    runs.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
