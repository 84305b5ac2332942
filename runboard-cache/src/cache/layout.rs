//! On-disk layout of one user's durable cache.
//!
//! ```text
//! <cache-root>/<namespace>/runs/<run-id>.json
//! <cache-root>/<namespace>/user-info.json
//! <cache-root>/<namespace>/file-hashes.json
//! <cache-root>/<namespace>/repositories/list.json
//! <cache-root>/<namespace>/last-repository.json
//! ```

use std::path::{Path, PathBuf};

use runboard_core::{sha256_hex, UserNamespace};

const RUNS_DIR: &str = "runs";
const REPOSITORIES_DIR: &str = "repositories";
const USER_INFO_FILE: &str = "user-info.json";
const FILE_HASHES_FILE: &str = "file-hashes.json";
const REPOSITORY_LIST_FILE: &str = "list.json";
const LAST_REPOSITORY_FILE: &str = "last-repository.json";

/// Marks a run file named by the hash of its id.
const HASHED_PREFIX: char = '~';

/// Extension of every persisted document.
pub const DOCUMENT_EXTENSION: &str = "json";

/// Paths for a single namespace under a cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    user_dir: PathBuf,
}

impl CacheLayout {
    pub fn new(cache_root: &Path, namespace: &UserNamespace) -> Self {
        Self {
            user_dir: cache_root.join(namespace.as_str()),
        }
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.user_dir.join(RUNS_DIR)
    }

    pub fn run_file(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(run_file_name(run_id))
    }

    pub fn user_info_file(&self) -> PathBuf {
        self.user_dir.join(USER_INFO_FILE)
    }

    pub fn file_hashes_file(&self) -> PathBuf {
        self.user_dir.join(FILE_HASHES_FILE)
    }

    pub fn repositories_dir(&self) -> PathBuf {
        self.user_dir.join(REPOSITORIES_DIR)
    }

    pub fn repository_list_file(&self) -> PathBuf {
        self.repositories_dir().join(REPOSITORY_LIST_FILE)
    }

    pub fn last_repository_file(&self) -> PathBuf {
        self.user_dir.join(LAST_REPOSITORY_FILE)
    }
}

/// File name for a run id.
///
/// Ids made only of `[A-Za-z0-9._-]` that do not start with `.` are used
/// verbatim; anything else is stored under `~` plus the SHA-256 hex of the id
/// so it can never name a path outside the runs directory. `~` is outside the
/// verbatim alphabet, so a hashed name never equals a verbatim one.
pub fn run_file_name(run_id: &str) -> String {
    let safe = !run_id.is_empty()
        && !run_id.starts_with('.')
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if safe {
        format!("{}.{}", run_id, DOCUMENT_EXTENSION)
    } else {
        format!("{}{}.{}", HASHED_PREFIX, sha256_hex(run_id.as_bytes()), DOCUMENT_EXTENSION)
    }
}

/// True if `path` looks like a persisted document (not a temp file).
pub fn is_document(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(DOCUMENT_EXTENSION)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| !name.starts_with('.'))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let ns = UserNamespace::for_user(Some("alice"));
        let layout = CacheLayout::new(Path::new("/cache"), &ns);

        let user_dir = PathBuf::from("/cache").join(ns.as_str());
        assert_eq!(layout.user_dir(), user_dir.as_path());
        assert_eq!(layout.run_file("run-1"), user_dir.join("runs/run-1.json"));
        assert_eq!(layout.user_info_file(), user_dir.join("user-info.json"));
        assert_eq!(layout.file_hashes_file(), user_dir.join("file-hashes.json"));
        assert_eq!(
            layout.repository_list_file(),
            user_dir.join("repositories/list.json")
        );
        assert_eq!(
            layout.last_repository_file(),
            user_dir.join("last-repository.json")
        );
    }

    #[test]
    fn test_unsafe_run_ids_are_hashed() {
        assert_eq!(run_file_name("abc-123_x.y"), "abc-123_x.y.json");

        for hostile in ["../escape", "a/b", ".hidden", "", "sp ace"] {
            let name = run_file_name(hostile);
            assert_eq!(name.len(), 1 + 64 + 5, "{hostile:?} -> {name}");
            assert!(name.starts_with('~'));
            assert!(!name.contains('/'));
        }
    }

    #[test]
    fn test_hashed_names_never_equal_verbatim_names() {
        let hostile = "a/b";
        let digest = sha256_hex(hostile.as_bytes());
        assert_ne!(run_file_name(hostile), run_file_name(&digest));
        assert_eq!(run_file_name(&digest), format!("{digest}.json"));
    }

    #[test]
    fn test_is_document() {
        assert!(is_document(Path::new("/x/runs/r1.json")));
        assert!(!is_document(Path::new("/x/runs/.tmpAbC123")));
        assert!(!is_document(Path::new("/x/runs/.tmp.json")));
        assert!(!is_document(Path::new("/x/runs/r1.txt")));
    }
}
