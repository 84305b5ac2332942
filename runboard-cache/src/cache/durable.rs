//! Per-user durable store backed by JSON documents on disk.
//!
//! Holds the records that should survive a restart: terminal runs, runs stuck
//! past the staleness threshold, the user profile, file hashes and repository
//! selections.
//!
//! # Crash Safety
//!
//! Every write goes to a temp file in the destination directory and is then
//! renamed over the target, so readers only ever see a complete old document
//! or a complete new one.
//!
//! # Self-Healing
//!
//! A document that fails to parse (or a run that no longer belongs on disk) is
//! deleted and reported as a miss. Only directory-level failures such as
//! permission errors are surfaced as errors.
//!
//! # Thread Safety
//!
//! One `RwLock` per instance serializes this process's file operations:
//! reads share the lock, writes take it exclusively. There is no
//! inter-process locking; two processes writing the same whole-file entity
//! resolve as last-writer-wins.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use runboard_core::{
    FileHashRecord, LastUsedRepository, RepositoryList, Run, RunboardResult, StorageError,
    StoreTier, UserNamespace, UserProfile,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use super::freshness::Stamped;
use super::layout::{is_document, CacheLayout};
use super::traits::RunTier;

/// Outcome of reading one document.
enum Document<T> {
    Missing,
    Parsed(T),
    Malformed(String),
}

/// Durable, per-user JSON document store.
///
/// # Example
///
/// ```ignore
/// use runboard_cache::DurableStore;
/// use runboard_core::UserNamespace;
///
/// let store = DurableStore::open("/tmp/runboard", UserNamespace::for_user(Some("alice")))?;
/// store.set_run(&finished_run)?;
/// let run = store.get_run(&finished_run.id)?;
/// ```
#[derive(Debug)]
pub struct DurableStore {
    namespace: UserNamespace,
    layout: CacheLayout,
    lock: RwLock<()>,
}

impl DurableStore {
    /// Open (creating if needed) the store for `namespace` under `cache_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the user's directories cannot be created.
    pub fn open(cache_root: impl AsRef<Path>, namespace: UserNamespace) -> RunboardResult<Self> {
        let layout = CacheLayout::new(cache_root.as_ref(), &namespace);
        ensure_dirs(&layout)?;
        tracing::debug!(
            namespace = %namespace,
            path = %layout.user_dir().display(),
            "Durable store opened"
        );
        Ok(Self {
            namespace,
            layout,
            lock: RwLock::new(()),
        })
    }

    pub fn namespace(&self) -> &UserNamespace {
        &self.namespace
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, ()>, StorageError> {
        self.lock.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write_guard(&self) -> Result<RwLockWriteGuard<'_, ()>, StorageError> {
        self.lock.write().map_err(|_| StorageError::LockPoisoned)
    }

    // ========================================================================
    // RUNS
    // ========================================================================

    /// Load a run by id. Corrupt or no-longer-durable documents are deleted
    /// and reported as `None`. A document holding a different id is a miss
    /// and is left in place.
    pub fn get_run(&self, id: &str) -> RunboardResult<Option<Run>> {
        let path = self.layout.run_file(id);
        let run = self.load_valid(&path, |run: &Run| run.is_durable_eligible(Utc::now()))?;
        Ok(run.filter(|run| {
            let matches = run.id == id;
            if !matches {
                tracing::debug!(run_id = id, stored_id = %run.id, "Run file holds another id");
            }
            matches
        }))
    }

    /// Persist a run if it is durable-eligible; otherwise do nothing.
    pub fn set_run(&self, run: &Run) -> RunboardResult<()> {
        if !run.is_durable_eligible(Utc::now()) {
            tracing::debug!(run_id = %run.id, status = %run.status, "Skipping non-durable run");
            return Ok(());
        }
        let path = self.layout.run_file(&run.id);
        let _guard = self.write_guard()?;
        write_document(&path, run)
    }

    /// Persist every durable-eligible run in `runs` under one write lock.
    pub fn set_runs(&self, runs: &[Run]) -> RunboardResult<()> {
        let now = Utc::now();
        let _guard = self.write_guard()?;
        for run in runs.iter().filter(|run| run.is_durable_eligible(now)) {
            write_document(&self.layout.run_file(&run.id), run)?;
        }
        Ok(())
    }

    /// Every persisted run that still parses and is still durable-eligible.
    ///
    /// Documents that fail either check are deleted as a side effect.
    pub fn get_all_runs(&self) -> RunboardResult<Vec<Run>> {
        let now = Utc::now();
        let mut runs = Vec::new();
        let mut rejected = Vec::new();
        {
            let _guard = self.read_guard()?;
            for path in list_documents(&self.layout.runs_dir())? {
                match read_document::<Run>(&path) {
                    Ok(Document::Parsed(run)) if run.is_durable_eligible(now) => runs.push(run),
                    Ok(Document::Parsed(run)) => {
                        rejected.push((path, format!("run {} is no longer durable", run.id)))
                    }
                    Ok(Document::Malformed(reason)) => rejected.push((path, reason)),
                    Ok(Document::Missing) => {}
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "Skipping unreadable run file");
                    }
                }
            }
        }

        for (path, reason) in rejected {
            self.discard_invalid(&path, &reason, |run: &Run| run.is_durable_eligible(Utc::now()))?;
        }
        Ok(runs)
    }

    /// Delete a run. Absent runs are not an error.
    pub fn invalidate_run(&self, id: &str) -> RunboardResult<()> {
        let path = self.layout.run_file(id);
        let _guard = self.write_guard()?;
        remove_document(&path)
    }

    /// Number of run documents on disk. Does not parse them.
    pub fn run_count(&self) -> RunboardResult<usize> {
        let _guard = self.read_guard()?;
        Ok(list_documents(&self.layout.runs_dir())?.len())
    }

    // ========================================================================
    // WHOLE-FILE ENTITIES
    // ========================================================================

    /// The stored profile together with when it was stored.
    pub fn get_user_profile(&self) -> RunboardResult<Option<Stamped<UserProfile>>> {
        self.load_valid(&self.layout.user_info_file(), |_: &Stamped<UserProfile>| true)
    }

    pub fn set_user_profile(&self, profile: &UserProfile) -> RunboardResult<()> {
        let _guard = self.write_guard()?;
        write_document(&self.layout.user_info_file(), &Stamped::now(profile))
    }

    /// The full file-hash map; empty when nothing is stored.
    pub fn get_all_file_hashes(&self) -> RunboardResult<FileHashRecord> {
        Ok(self
            .load_valid(&self.layout.file_hashes_file(), |_: &FileHashRecord| true)?
            .unwrap_or_default())
    }

    pub fn get_file_hash(&self, file_path: &str) -> RunboardResult<Option<String>> {
        Ok(self
            .get_all_file_hashes()?
            .get(file_path)
            .map(str::to_string))
    }

    /// Read-modify-write of the whole hash map under the write lock.
    pub fn set_file_hash(&self, file_path: &str, hash: &str) -> RunboardResult<()> {
        let path = self.layout.file_hashes_file();
        let _guard = self.write_guard()?;
        let mut record = match read_document::<FileHashRecord>(&path)? {
            Document::Parsed(record) => record,
            Document::Missing => FileHashRecord::new(),
            Document::Malformed(reason) => {
                tracing::warn!(
                    path = %path.display(),
                    reason = %reason,
                    "Replacing malformed file-hash map"
                );
                FileHashRecord::new()
            }
        };
        record.insert(file_path, hash);
        write_document(&path, &record)
    }

    pub fn get_repository_list(&self) -> RunboardResult<Option<RepositoryList>> {
        self.load_valid(&self.layout.repository_list_file(), |_: &RepositoryList| true)
    }

    pub fn set_repository_list(&self, list: &RepositoryList) -> RunboardResult<()> {
        let _guard = self.write_guard()?;
        write_document(&self.layout.repository_list_file(), list)
    }

    pub fn get_last_used_repository(&self) -> RunboardResult<Option<LastUsedRepository>> {
        self.load_valid(&self.layout.last_repository_file(), |_: &LastUsedRepository| true)
    }

    pub fn set_last_used_repository(&self, last: &LastUsedRepository) -> RunboardResult<()> {
        let _guard = self.write_guard()?;
        write_document(&self.layout.last_repository_file(), last)
    }

    /// Touch `repo` in the repository list and make it the last used one.
    /// Both files are written under a single write lock.
    pub fn record_repository_use(&self, repo: &str) -> RunboardResult<()> {
        let list_path = self.layout.repository_list_file();
        let _guard = self.write_guard()?;
        let mut list = match read_document::<RepositoryList>(&list_path)? {
            Document::Parsed(list) => list,
            Document::Missing | Document::Malformed(_) => RepositoryList::default(),
        };
        list.touch(repo);
        write_document(&list_path, &list)?;
        write_document(
            &self.layout.last_repository_file(),
            &LastUsedRepository::now(repo),
        )
    }

    /// Remove everything stored for this user and recreate the empty layout.
    pub fn clear(&self) -> RunboardResult<()> {
        let _guard = self.write_guard()?;
        match fs::remove_dir_all(self.layout.user_dir()) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StorageError::io(self.layout.user_dir(), &err).into()),
        }
        ensure_dirs(&self.layout)?;
        tracing::info!(namespace = %self.namespace, "Durable store cleared");
        Ok(())
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// Read `path` under the read lock; delete it if it is malformed or fails
    /// `valid`, reporting a miss.
    fn load_valid<T, F>(&self, path: &Path, valid: F) -> RunboardResult<Option<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let document = {
            let _guard = self.read_guard()?;
            read_document::<T>(path)?
        };
        match document {
            Document::Missing => Ok(None),
            Document::Parsed(value) if valid(&value) => Ok(Some(value)),
            Document::Parsed(_) => {
                self.discard_invalid(path, "failed validation", valid)?;
                Ok(None)
            }
            Document::Malformed(reason) => {
                self.discard_invalid(path, &reason, valid)?;
                Ok(None)
            }
        }
    }

    /// Delete `path` under the write lock if it is still invalid.
    ///
    /// Re-checks after acquiring the lock: a writer may have replaced the
    /// document between the read and now.
    fn discard_invalid<T, F>(&self, path: &Path, reason: &str, valid: F) -> RunboardResult<()>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let _guard = self.write_guard()?;
        let still_invalid = match read_document::<T>(path)? {
            Document::Missing => false,
            Document::Parsed(value) => !valid(&value),
            Document::Malformed(_) => true,
        };
        if still_invalid {
            tracing::warn!(path = %path.display(), reason = %reason, "Removing invalid cache document");
            remove_document(path)?;
        }
        Ok(())
    }
}

impl RunTier for DurableStore {
    fn tier(&self) -> StoreTier {
        StoreTier::Durable
    }

    fn get_run(&self, id: &str) -> RunboardResult<Option<Run>> {
        DurableStore::get_run(self, id)
    }

    fn put_run(&self, run: &Run) -> RunboardResult<()> {
        self.set_run(run)
    }

    fn all_runs(&self) -> RunboardResult<Option<Vec<Run>>> {
        let runs = self.get_all_runs()?;
        Ok(if runs.is_empty() { None } else { Some(runs) })
    }

    fn remove_run(&self, id: &str) -> RunboardResult<()> {
        self.invalidate_run(id)
    }

    fn run_count(&self) -> RunboardResult<usize> {
        DurableStore::run_count(self)
    }
}

// ============================================================================
// FILE HELPERS
// ============================================================================

fn ensure_dirs(layout: &CacheLayout) -> Result<(), StorageError> {
    for dir in [layout.runs_dir(), layout.repositories_dir()] {
        fs::create_dir_all(&dir).map_err(|err| StorageError::io(&dir, &err))?;
    }
    Ok(())
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Document<T>, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Document::Missing),
        Err(err) => return Err(StorageError::io(path, &err)),
    };
    Ok(match serde_json::from_slice::<T>(&bytes) {
        Ok(value) => Document::Parsed(value),
        Err(err) => Document::Malformed(err.to_string()),
    })
}

/// Serialize `value` to a temp file beside `path`, then rename it into place.
fn write_document<T: Serialize + ?Sized>(path: &Path, value: &T) -> RunboardResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, &err))?;

    let bytes = serde_json::to_vec_pretty(value).map_err(|err| StorageError::serialization(path, &err))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|err| StorageError::io(parent, &err))?;
    temp.write_all(&bytes)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|err| StorageError::io(temp.path(), &err))?;
    temp.persist(path)
        .map_err(|err| StorageError::io(path, &err.error))?;
    Ok(())
}

fn remove_document(path: &Path) -> RunboardResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StorageError::io(path, &err).into()),
    }
}

/// Document paths in `dir`. A missing directory lists as empty; any other
/// enumeration failure propagates.
fn list_documents(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StorageError::io(dir, &err)),
    };
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| StorageError::io(dir, &err))?;
        let path = entry.path();
        if is_document(&path) {
            paths.push(path);
        }
    }
    Ok(paths)
}
