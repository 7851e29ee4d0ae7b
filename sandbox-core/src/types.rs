//! Domain types for the sandbox control plane.
//!
//! File paths inside a [`FileChange`] are relative and `/`-separated strings,
//! not `PathBuf`: they come from the change tracker and are reported verbatim.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identifier of a reload event; the only key into the result store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Generate a fresh, collision-resistant id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An id is usable as a store key when it is a single, non-hidden path
    /// component that does not name the store's log directory.
    pub fn is_valid(&self) -> bool {
        let id = self.0.as_str();
        !id.is_empty()
            && !id.starts_with('.')
            && id != crate::store::LOG_DIR
            && !id.contains(['/', '\\', '\0'])
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Reload events
// ---------------------------------------------------------------------------

/// One unit of reload work handed to the reload worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadEvent {
    pub id: EventId,
    pub rebuild: bool,
    pub relaunch: bool,
}

impl ReloadEvent {
    /// New event with a freshly generated id.
    pub fn new(rebuild: bool, relaunch: bool) -> Self {
        Self {
            id: EventId::generate(),
            rebuild,
            relaunch,
        }
    }
}

/// Lifecycle status of a reload event.
///
/// `Processing` is written on acceptance and replaced exactly once by
/// `Success` or `Failed`. `Unknown` is only ever returned by queries for ids
/// without a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadStatus {
    Processing,
    Success,
    Failed,
    Unknown,
}

impl ReloadStatus {
    /// Status-file representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadStatus::Processing => "Processing",
            ReloadStatus::Success => "Success",
            ReloadStatus::Failed => "Failed",
            ReloadStatus::Unknown => "Unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReloadStatus::Success | ReloadStatus::Failed)
    }
}

impl fmt::Display for ReloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Processing" => Ok(ReloadStatus::Processing),
            "Success" => Ok(ReloadStatus::Success),
            "Failed" => Ok(ReloadStatus::Failed),
            "Unknown" => Ok(ReloadStatus::Unknown),
            other => Err(format!("unknown reload status '{other}'")),
        }
    }
}

/// Query projection assembled from the result store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadResult {
    pub id: EventId,
    pub status: ReloadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

// ---------------------------------------------------------------------------
// Change sets
// ---------------------------------------------------------------------------

/// Classification of a changed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Added,
    Modified,
    Deleted,
}

impl FileAction {
    /// Single-letter code as printed by `git diff --name-status`.
    pub fn code(&self) -> char {
        match self {
            FileAction::Added => 'A',
            FileAction::Modified => 'M',
            FileAction::Deleted => 'D',
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(FileAction::Added),
            "M" => Some(FileAction::Modified),
            "D" => Some(FileAction::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileAction::Added => write!(f, "added"),
            FileAction::Modified => write!(f, "modified"),
            FileAction::Deleted => write!(f, "deleted"),
        }
    }
}

/// A single changed file between the tracked baseline and the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub action: FileAction,
    /// Relative, `/`-separated path. Inside a [`DirTree`] this is the file name only.
    pub path: String,
    /// Current content; empty for deletions or when content loading is off.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
}

impl FileChange {
    pub fn new(action: FileAction, path: impl Into<String>) -> Self {
        Self {
            action,
            path: path.into(),
            content: String::new(),
        }
    }
}

/// Compressed directory report of a change set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirTree {
    pub name: String,
    #[serde(default)]
    pub dirs: Vec<DirTree>,
    #[serde(default)]
    pub files: Vec<FileChange>,
}

impl DirTree {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

/// Characters the supervisor config format cannot carry in a program name.
pub const FORBIDDEN_PROCESS_TYPE_CHARS: &[char] = &['/', '>', '<', ':', '|', '&', '\\'];

/// One runnable process type (e.g. `web`, `worker`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    pub process_type: String,
    pub command: String,
}

impl ProcessDescriptor {
    pub fn new(process_type: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            process_type: process_type.into(),
            command: command.into(),
        }
    }

    /// A type is valid when it is non-empty and free of supervisor-reserved characters.
    pub fn has_valid_type(&self) -> bool {
        !self.process_type.trim().is_empty()
            && !self.process_type.contains(FORBIDDEN_PROCESS_TYPE_CHARS)
    }
}

/// Every descriptor type that fails [`ProcessDescriptor::has_valid_type`], in input order.
pub fn invalid_process_types(descriptors: &[ProcessDescriptor]) -> Vec<String> {
    descriptors
        .iter()
        .filter(|d| !d.has_valid_type())
        .map(|d| d.process_type.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_valid() {
        let a = EventId::generate();
        let b = EventId::generate();
        assert_ne!(a, b);
        assert!(a.is_valid());
    }

    #[test]
    fn path_like_ids_are_invalid() {
        for id in ["", "../etc", ".hidden", "a/b", "a\\b", "log"] {
            assert!(!EventId::from(id).is_valid(), "{id:?} should be invalid");
        }
    }

    #[test]
    fn status_parses_its_own_file_form() {
        for status in [
            ReloadStatus::Processing,
            ReloadStatus::Success,
            ReloadStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ReloadStatus>(), Ok(status));
        }
        assert!("done".parse::<ReloadStatus>().is_err());
    }

    #[test]
    fn status_json_is_lowercase() {
        let json = serde_json::to_string(&ReloadStatus::Processing).expect("serialize");
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn only_success_and_failed_are_terminal() {
        assert!(ReloadStatus::Success.is_terminal());
        assert!(ReloadStatus::Failed.is_terminal());
        assert!(!ReloadStatus::Processing.is_terminal());
        assert!(!ReloadStatus::Unknown.is_terminal());
    }

    #[test]
    fn process_type_validation_lists_offenders_in_order() {
        let descriptors = vec![
            ProcessDescriptor::new("web", "bin/web"),
            ProcessDescriptor::new("a|b", "x"),
            ProcessDescriptor::new("worker", "bin/worker"),
            ProcessDescriptor::new("c:d", "y"),
            ProcessDescriptor::new("", "z"),
        ];
        assert_eq!(
            invalid_process_types(&descriptors),
            vec!["a|b".to_string(), "c:d".to_string(), String::new()]
        );
    }

    #[test]
    fn action_codes() {
        assert_eq!(FileAction::from_code("A"), Some(FileAction::Added));
        assert_eq!(FileAction::from_code("R"), None);
        assert_eq!(FileAction::Deleted.code(), 'D');
    }
}
