//! Durable, id-keyed reload status and log storage.
//!
//! # Storage layout
//!
//! ```text
//! <root>/
//!   <id>          (status record: `Processing` | `Success` | `Failed`, mode 0600)
//!   log/
//!     <id>        (append-only step output)
//! ```
//!
//! Status writes use the `.tmp` + rename pattern so a crash never leaves a
//! half-written record behind. A single writer per id is assumed; writers for
//! different ids never touch the same file.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{store_io, StoreError};
use crate::types::{EventId, ReloadResult, ReloadStatus};

/// Subdirectory holding step logs; never a valid event id.
pub(crate) const LOG_DIR: &str = "log";

/// Filesystem-backed result store.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
    log_root: PathBuf,
}

impl ResultStore {
    /// Open the store at `root`, eagerly creating `root/` and `root/log/`.
    ///
    /// Fails only when the directories cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let log_root = root.join(LOG_DIR);
        for dir in [&root, &log_root] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| store_io(dir, e))?;
                set_dir_permissions(dir)?;
            }
        }
        Ok(Self { root, log_root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn status_path(&self, id: &EventId) -> PathBuf {
        self.root.join(&id.0)
    }

    pub fn log_path(&self, id: &EventId) -> PathBuf {
        self.log_root.join(&id.0)
    }

    /// Create or overwrite the status record for `id`. Last write wins.
    pub fn write_status(&self, id: &EventId, status: ReloadStatus) -> Result<(), StoreError> {
        check_id(id)?;
        if status == ReloadStatus::Unknown {
            return Err(StoreError::UnknownNotWritable { id: id.0.clone() });
        }

        let path = self.status_path(id);
        let tmp = self.root.join(format!(".{}.tmp", id.0));
        std::fs::write(&tmp, status.as_str()).map_err(|e| store_io(&tmp, e))?;
        set_file_permissions(&tmp)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(store_io(&path, e));
        }
        Ok(())
    }

    /// Read the status record for `id`.
    ///
    /// Returns [`StoreError::NotFound`] when no record exists; callers that
    /// need a status regardless use [`ResultStore::status_or_unknown`].
    pub fn read_status(&self, id: &EventId) -> Result<ReloadStatus, StoreError> {
        check_id(id)?;
        let path = self.status_path(id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound { id: id.0.clone() });
            }
            Err(err) => return Err(store_io(&path, err)),
        };
        content
            .parse::<ReloadStatus>()
            .ok()
            .filter(|status| *status != ReloadStatus::Unknown)
            .ok_or_else(|| StoreError::Corrupt {
                id: id.0.clone(),
                content,
            })
    }

    /// Like [`ResultStore::read_status`] but maps a missing record to `Unknown`.
    pub fn status_or_unknown(&self, id: &EventId) -> Result<ReloadStatus, StoreError> {
        match self.read_status(id) {
            Ok(status) => Ok(status),
            Err(StoreError::NotFound { .. }) => Ok(ReloadStatus::Unknown),
            Err(err) => Err(err),
        }
    }

    /// Open (creating if absent) the append-only log for `id`.
    pub fn log_writer(&self, id: &EventId) -> Result<File, StoreError> {
        check_id(id)?;
        let path = self.log_path(id);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| store_io(&path, e))
    }

    /// Full log content for `id`.
    pub fn read_log(&self, id: &EventId) -> Result<String, StoreError> {
        check_id(id)?;
        let path = self.log_path(id);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound { id: id.0.clone() })
            }
            Err(err) => Err(store_io(&path, err)),
        }
    }

    /// Query projection: always yields a status; the log is attached on request.
    ///
    /// An event that was accepted but has not logged anything yet reports an
    /// empty log rather than an error.
    pub fn query(&self, id: &EventId, include_log: bool) -> Result<ReloadResult, StoreError> {
        let status = self.status_or_unknown(id)?;
        let log = if include_log && status != ReloadStatus::Unknown {
            match self.read_log(id) {
                Ok(log) => Some(log),
                Err(StoreError::NotFound { .. }) => Some(String::new()),
                Err(err) => return Err(err),
            }
        } else {
            None
        };
        Ok(ReloadResult {
            id: id.clone(),
            status,
            log,
        })
    }
}

fn check_id(id: &EventId) -> Result<(), StoreError> {
    if id.is_valid() {
        Ok(())
    } else {
        Err(StoreError::InvalidId { id: id.0.clone() })
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| store_io(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| store_io(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn store() -> (TempDir, ResultStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = ResultStore::open(dir.path().join("results")).expect("open");
        (dir, store)
    }

    #[test]
    fn open_creates_root_and_log_dirs() {
        let (dir, _store) = store();
        assert!(dir.path().join("results").is_dir());
        assert!(dir.path().join("results").join("log").is_dir());
    }

    #[test]
    fn status_lifecycle_last_write_wins() {
        let (_dir, store) = store();
        let id = EventId::generate();

        let err = store.read_status(&id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.status_or_unknown(&id).unwrap(), ReloadStatus::Unknown);

        store.write_status(&id, ReloadStatus::Processing).unwrap();
        assert_eq!(store.read_status(&id).unwrap(), ReloadStatus::Processing);

        store.write_status(&id, ReloadStatus::Success).unwrap();
        assert_eq!(store.read_status(&id).unwrap(), ReloadStatus::Success);
        let raw = std::fs::read_to_string(store.status_path(&id)).unwrap();
        assert_eq!(raw, "Success", "no intermediate state retained");
    }

    #[test]
    fn unknown_is_never_written() {
        let (_dir, store) = store();
        let id = EventId::generate();
        let err = store.write_status(&id, ReloadStatus::Unknown).unwrap_err();
        assert!(matches!(err, StoreError::UnknownNotWritable { .. }));
        assert!(!store.status_path(&id).exists());
    }

    #[test]
    fn log_writer_appends_across_opens() {
        let (_dir, store) = store();
        let id = EventId::generate();
        {
            let mut log = store.log_writer(&id).unwrap();
            writeln!(log, "step one").unwrap();
        }
        {
            let mut log = store.log_writer(&id).unwrap();
            writeln!(log, "step two").unwrap();
        }
        assert_eq!(store.read_log(&id).unwrap(), "step one\nstep two\n");
    }

    #[test]
    fn path_traversal_ids_are_rejected() {
        let (_dir, store) = store();
        let id = EventId::from("../escape");
        assert!(matches!(
            store.write_status(&id, ReloadStatus::Success),
            Err(StoreError::InvalidId { .. })
        ));
        assert!(matches!(store.log_writer(&id), Err(StoreError::InvalidId { .. })));
    }

    #[test]
    fn log_directory_name_is_not_an_event() {
        let (_dir, store) = store();
        let id = EventId::from("log");
        assert!(matches!(
            store.write_status(&id, ReloadStatus::Success),
            Err(StoreError::InvalidId { .. })
        ));
        assert!(matches!(store.query(&id, true), Err(StoreError::InvalidId { .. })));
        assert!(store.root().join("log").is_dir(), "log directory clobbered");
    }

    #[test]
    fn corrupt_status_is_reported() {
        let (_dir, store) = store();
        let id = EventId::from("abc");
        std::fs::write(store.status_path(&id), "half-writ").unwrap();
        assert!(matches!(store.read_status(&id), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn query_attaches_log_only_when_requested() {
        let (_dir, store) = store();
        let id = EventId::generate();
        store.write_status(&id, ReloadStatus::Failed).unwrap();
        {
            let mut log = store.log_writer(&id).unwrap();
            write!(log, "build failed").unwrap();
        }

        let bare = store.query(&id, false).unwrap();
        assert_eq!(bare.status, ReloadStatus::Failed);
        assert!(bare.log.is_none());

        let full = store.query(&id, true).unwrap();
        assert_eq!(full.log.as_deref(), Some("build failed"));

        let missing = store.query(&EventId::generate(), true).unwrap();
        assert_eq!(missing.status, ReloadStatus::Unknown);
        assert!(missing.log.is_none());
    }
}
