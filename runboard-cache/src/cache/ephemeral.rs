//! In-process TTL table for records that change often.
//!
//! Holds fresh, non-terminal runs, the "all runs" list, form drafts and
//! dashboard snapshots. Entries expire after their TTL; runs additionally
//! leave as soon as they become durable-eligible, so this store never answers
//! for a record the durable tier owns.
//!
//! # Thread Safety
//!
//! Backed by a `DashMap`; every operation is safe from any number of threads
//! without an external lock. Expiry is lazy on read and also performed by a
//! background sweeper task owned by the store.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use runboard_core::{
    CacheConfig, DashboardSnapshot, FormDraft, Run, RunboardResult, StoreTier, Timestamp,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::traits::RunTier;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntryKey {
    Run(String),
    AllRuns,
    FormDraft,
    Dashboard,
}

#[derive(Debug, Clone)]
enum EntryValue {
    Run(Run),
    RunList(Vec<Run>),
    FormDraft(FormDraft),
    Dashboard(DashboardSnapshot),
}

#[derive(Debug, Clone)]
struct Entry {
    value: EntryValue,
    expires_at: Instant,
}

impl Entry {
    fn new(value: EntryValue, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Expired, or a run that has aged into the durable tier.
    fn is_stale(&self, instant: Instant, now: Timestamp) -> bool {
        if instant >= self.expires_at {
            return true;
        }
        match &self.value {
            EntryValue::Run(run) => run.is_durable_eligible(now),
            _ => false,
        }
    }
}

/// Per-kind TTLs.
#[derive(Debug, Clone, Copy)]
struct Ttls {
    run: Duration,
    form_draft: Duration,
    dashboard: Duration,
}

#[derive(Debug)]
struct EphemeralInner {
    entries: DashMap<EntryKey, Entry>,
    ttls: Ttls,
}

impl EphemeralInner {
    /// Clone the live value under `key`, removing it if stale.
    fn live(&self, key: &EntryKey) -> Option<EntryValue> {
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        let (instant, now) = (Instant::now(), Utc::now());
        if entry.is_stale(instant, now) {
            self.entries.remove_if(key, |_, e| e.is_stale(instant, now));
            return None;
        }
        Some(entry.value)
    }

    fn purge_expired(&self) -> usize {
        let (instant, now) = (Instant::now(), Utc::now());
        let stale: Vec<EntryKey> = self
            .entries
            .iter()
            .filter(|e| e.value().is_stale(instant, now))
            .map(|e| e.key().clone())
            .collect();
        stale
            .into_iter()
            .filter(|key| {
                self.entries
                    .remove_if(key, |_, e| e.is_stale(instant, now))
                    .is_some()
            })
            .count()
    }
}

/// Handle to the background expiry task.
#[derive(Debug)]
struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn on the current tokio runtime. Returns `None` outside a runtime.
    fn spawn(inner: Arc<EphemeralInner>, period: Duration) -> Option<Self> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::debug!("No tokio runtime; ephemeral expiry stays lazy");
                return None;
            }
        };
        if period.is_zero() {
            tracing::warn!("Zero sweep interval; ephemeral expiry stays lazy");
            return None;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(sweep_interval_ms = period.as_millis() as u64, "Ephemeral sweeper started");

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let purged = inner.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, "Ephemeral sweep removed entries");
                        } else {
                            tracing::trace!("Ephemeral sweep found nothing to remove");
                        }
                    }
                }
            }

            tracing::info!("Ephemeral sweeper stopped");
        });

        Some(Self {
            shutdown_tx,
            handle,
        })
    }
}

/// Concurrent in-memory run cache with TTL expiry.
///
/// # Example
///
/// ```ignore
/// let store = EphemeralStore::new(&CacheConfig::default());
/// store.set(&running);
/// assert!(store.get(&running.id).is_some());
/// store.stop();
/// ```
#[derive(Debug)]
pub struct EphemeralStore {
    inner: Arc<EphemeralInner>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl EphemeralStore {
    /// Create the store and, inside a tokio runtime, start its sweeper.
    pub fn new(config: &CacheConfig) -> Self {
        let inner = Arc::new(EphemeralInner {
            entries: DashMap::new(),
            ttls: Ttls {
                run: config.run_ttl,
                form_draft: config.form_draft_ttl,
                dashboard: config.dashboard_ttl,
            },
        });
        let sweeper = Sweeper::spawn(Arc::clone(&inner), config.sweep_interval);
        Self {
            inner,
            sweeper: Mutex::new(sweeper),
        }
    }

    // ========================================================================
    // RUNS
    // ========================================================================

    /// A run that is still ephemeral-eligible now. Runs that have aged into
    /// the durable tier are purged and reported as missing.
    pub fn get(&self, id: &str) -> Option<Run> {
        match self.inner.live(&EntryKey::Run(id.to_string()))? {
            EntryValue::Run(run) => Some(run),
            _ => None,
        }
    }

    /// Store a run if it is ephemeral-eligible; otherwise drop any copy held.
    ///
    /// Returns true if the run was stored. The "all runs" list is dropped
    /// either way so it cannot serve an outdated copy.
    pub fn set(&self, run: &Run) -> bool {
        let key = EntryKey::Run(run.id.clone());
        let stored = if run.is_durable_eligible(Utc::now()) {
            self.inner.entries.remove(&key);
            tracing::debug!(run_id = %run.id, "Refusing durable-eligible run in memory");
            false
        } else {
            self.inner
                .entries
                .insert(key, Entry::new(EntryValue::Run(run.clone()), self.inner.ttls.run));
            true
        };
        // After the write, so a concurrent `set_all` cannot restore a list
        // that predates it.
        self.inner.entries.remove(&EntryKey::AllRuns);
        stored
    }

    /// Store every ephemeral-eligible run individually plus the "all runs"
    /// list of those runs. Durable-eligible runs are removed instead.
    pub fn set_all(&self, runs: &[Run]) {
        let now = Utc::now();
        let ttl = self.inner.ttls.run;
        let mut fresh = Vec::with_capacity(runs.len());
        for run in runs {
            let key = EntryKey::Run(run.id.clone());
            if run.is_durable_eligible(now) {
                self.inner.entries.remove(&key);
            } else {
                self.inner
                    .entries
                    .insert(key, Entry::new(EntryValue::Run(run.clone()), ttl));
                fresh.push(run.clone());
            }
        }
        self.inner
            .entries
            .insert(EntryKey::AllRuns, Entry::new(EntryValue::RunList(fresh), ttl));
    }

    /// All ephemeral-eligible runs.
    ///
    /// Prefers the "all runs" list, filtered by current classification, and
    /// falls back to scanning individual entries. `None` if neither exists.
    pub fn get_all(&self) -> Option<Vec<Run>> {
        let now = Utc::now();
        if let Some(EntryValue::RunList(runs)) = self.inner.live(&EntryKey::AllRuns) {
            return Some(
                runs.into_iter()
                    .filter(|run| run.tier_at(now) == StoreTier::Ephemeral)
                    .collect(),
            );
        }

        let instant = Instant::now();
        let mut runs = Vec::new();
        let mut stale = Vec::new();
        for entry in self.inner.entries.iter() {
            if let EntryValue::Run(run) = &entry.value().value {
                if entry.value().is_stale(instant, now) {
                    stale.push(entry.key().clone());
                } else {
                    runs.push(run.clone());
                }
            }
        }
        for key in stale {
            self.inner
                .entries
                .remove_if(&key, |_, e| e.is_stale(instant, now));
        }
        if runs.is_empty() {
            None
        } else {
            Some(runs)
        }
    }

    /// Remove one run and the "all runs" list.
    pub fn invalidate_one(&self, id: &str) {
        self.inner.entries.remove(&EntryKey::Run(id.to_string()));
        self.inner.entries.remove(&EntryKey::AllRuns);
    }

    /// Remove the run held for `id` if it is no newer than `updated_at`.
    ///
    /// Used after the durable tier accepted a copy of the run. Leaves a newer
    /// in-memory copy alone. When a copy is removed the "all runs" list goes
    /// with it, since the list may hold the same outdated copy.
    pub fn discard_superseded(&self, id: &str, updated_at: Timestamp) -> bool {
        let removed = self
            .inner
            .entries
            .remove_if(&EntryKey::Run(id.to_string()), |_, e| match &e.value {
                EntryValue::Run(run) => run.updated_at <= updated_at,
                _ => false,
            })
            .is_some();
        if removed {
            self.inner.entries.remove(&EntryKey::AllRuns);
        }
        removed
    }

    /// Clear everything. This store only holds non-durable data.
    pub fn invalidate_active(&self) {
        self.inner.entries.clear();
    }

    /// Number of live run entries.
    pub fn run_count(&self) -> usize {
        let (instant, now) = (Instant::now(), Utc::now());
        self.inner
            .entries
            .iter()
            .filter(|e| matches!(e.value().value, EntryValue::Run(_)) && !e.value().is_stale(instant, now))
            .count()
    }

    // ========================================================================
    // UI STATE
    // ========================================================================

    pub fn get_form_draft(&self) -> Option<FormDraft> {
        match self.inner.live(&EntryKey::FormDraft)? {
            EntryValue::FormDraft(draft) => Some(draft),
            _ => None,
        }
    }

    pub fn set_form_draft(&self, draft: FormDraft) {
        self.inner.entries.insert(
            EntryKey::FormDraft,
            Entry::new(EntryValue::FormDraft(draft), self.inner.ttls.form_draft),
        );
    }

    pub fn get_dashboard_snapshot(&self) -> Option<DashboardSnapshot> {
        match self.inner.live(&EntryKey::Dashboard)? {
            EntryValue::Dashboard(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn set_dashboard_snapshot(&self, snapshot: DashboardSnapshot) {
        self.inner.entries.insert(
            EntryKey::Dashboard,
            Entry::new(EntryValue::Dashboard(snapshot), self.inner.ttls.dashboard),
        );
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Remove expired entries and runs that aged into the durable tier.
    /// Returns how many entries were removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    /// Total entries of every kind, including not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// True while the background sweeper is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|s| !s.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Stop the background sweeper. Safe to call any number of times.
    pub fn stop(&self) {
        let sweeper = match self.sweeper.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sweeper) = sweeper {
            let _ = sweeper.shutdown_tx.send(true);
        }
    }
}

impl Drop for EphemeralStore {
    fn drop(&mut self) {
        self.stop();
    }
}

impl RunTier for EphemeralStore {
    fn tier(&self) -> StoreTier {
        StoreTier::Ephemeral
    }

    fn get_run(&self, id: &str) -> RunboardResult<Option<Run>> {
        Ok(self.get(id))
    }

    fn put_run(&self, run: &Run) -> RunboardResult<()> {
        self.set(run);
        Ok(())
    }

    fn all_runs(&self) -> RunboardResult<Option<Vec<Run>>> {
        Ok(self.get_all())
    }

    fn remove_run(&self, id: &str) -> RunboardResult<()> {
        self.invalidate_one(id);
        Ok(())
    }

    fn run_count(&self) -> RunboardResult<usize> {
        Ok(EphemeralStore::run_count(self))
    }
}
