//! File identity: the key for every cache and metadata lookup.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Extensions handled as camera RAW containers (lowercase, no dot).
pub const RAW_EXTENSIONS: &[&str] = &[
    "3fr", "arw", "cr2", "cr3", "crw", "dcr", "dng", "erf", "fff", "iiq", "kdc", "mef", "mos",
    "mrw", "nef", "nrw", "orf", "pef", "raf", "raw", "rw2", "rwl", "sr2", "srf", "srw", "x3f",
];

/// A normalized absolute path plus a lazily read modification time.
///
/// Equality and hashing consider the path only. The modification time is
/// read at most once per identity value (clones share it); use
/// [`FileIdentity::current_modified`] when a fresh reading is needed for a
/// staleness check.
#[derive(Clone)]
pub struct FileIdentity {
    path: PathBuf,
    modified: Arc<OnceLock<Option<SystemTime>>>,
}

impl FileIdentity {
    /// Build an identity from any path, making it absolute and lexically normalized.
    ///
    /// Relative paths are resolved against the current working directory. The
    /// file does not have to exist.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };

        Self {
            path: normalize(&absolute),
            modified: Arc::new(OnceLock::new()),
        }
    }

    /// The normalized absolute path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component, for logging.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Lowercased extension without the dot, empty when there is none.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Whether the extension names a RAW container.
    pub fn is_raw(&self) -> bool {
        let ext = self.extension();
        RAW_EXTENSIONS.contains(&ext.as_str())
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Modification time, read from disk on first use and remembered.
    pub fn modified(&self) -> Option<SystemTime> {
        *self.modified.get_or_init(|| self.current_modified())
    }

    /// Modification time read from disk right now.
    pub fn current_modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
    }

    /// Milliseconds since the epoch of [`FileIdentity::modified`], 0 when unknown.
    pub fn stamp(&self) -> u128 {
        stamp_of(self.modified())
    }
}

/// Milliseconds since the epoch for an optional timestamp, 0 when unknown.
pub(crate) fn stamp_of(time: Option<SystemTime>) -> u128 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Remove `.` and resolve `..` without touching the file system.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl PartialEq for FileIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileIdentity {}

impl Hash for FileIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileIdentity").field(&self.path).finish()
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl From<&Path> for FileIdentity {
    fn from(path: &Path) -> Self {
        FileIdentity::new(path)
    }
}

impl From<PathBuf> for FileIdentity {
    fn from(path: PathBuf) -> Self {
        FileIdentity::new(path)
    }
}
