//! Git-backed change tracking for a source tree.
//!
//! The tracker drives the `git` binary as a subprocess:
//!
//! | Operation  | Commands                                                        |
//! |------------|-----------------------------------------------------------------|
//! | `prepare`  | `init` (only when `.git` is missing), `add --all`, `commit`     |
//! | `diff`     | `add --all`, `diff --cached --name-status --no-renames HEAD`    |
//! | `commit`   | `add --all`, `commit --allow-empty`                             |
//! | `pending`  | `diff --name-status --no-renames HEAD`, `ls-files --others`     |
//! | `baseline_content` | `show HEAD:<path>`                                      |
//!
//! `prepare`, `diff` and `commit` write the index and are not safe to run
//! concurrently against the same tree; the caller serializes them.
//! `pending` and `baseline_content` only read, and pass
//! `--no-optional-locks` so they never take the index lock.

use std::path::{Path, PathBuf};
use std::process::Command;

use sandbox_core::{FileAction, FileChange};

use crate::error::{io_err, ChangeSetError};
use crate::parse::parse_name_status;

const GIT: &str = "git";
const AUTHOR_NAME: &str = "sandbox";
const AUTHOR_EMAIL: &str = "sandbox@localhost";
const BASELINE_MESSAGE: &str = "sandbox baseline";

/// Change tracker rooted at a source tree.
#[derive(Debug, Clone)]
pub struct Tracker {
    root: PathBuf,
    ignore_prefixes: Vec<String>,
}

impl Tracker {
    pub fn new(root: impl Into<PathBuf>, ignore_prefixes: Vec<String>) -> Self {
        Self {
            root: root.into(),
            ignore_prefixes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the tree already carries tracking metadata.
    pub fn is_prepared(&self) -> bool {
        self.root.join(".git").exists()
    }

    /// Initialise tracking metadata and record a baseline commit.
    ///
    /// Idempotent: an already-prepared tree is left untouched.
    pub fn prepare(&self) -> Result<(), ChangeSetError> {
        if self.is_prepared() {
            tracing::debug!("tracker already prepared: {}", self.root.display());
            return Ok(());
        }
        std::fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;
        self.git(&["init", "--quiet"])?;
        self.stage_and_commit(BASELINE_MESSAGE)?;
        tracing::info!("initialised change tracking in {}", self.root.display());
        Ok(())
    }

    /// Every file added, modified or deleted since the last baseline.
    ///
    /// With `with_content`, the current content of non-deleted files is
    /// attached; a file that cannot be read fails the whole diff.
    pub fn diff(&self, with_content: bool) -> Result<Vec<FileChange>, ChangeSetError> {
        self.git(&["add", "--all"])?;
        let output = self.git(&["diff", "--cached", "--name-status", "--no-renames", "HEAD"])?;
        let mut changes = parse_name_status(&output, &self.ignore_prefixes);
        if with_content {
            self.load_content(&mut changes)?;
        }

        tracing::debug!("{} change(s) in {}", changes.len(), self.root.display());
        Ok(changes)
    }

    /// Like [`Tracker::diff`] but read-only: the index is neither staged
    /// nor locked, so it is safe to call while a deploy runs.
    pub fn pending(&self, with_content: bool) -> Result<Vec<FileChange>, ChangeSetError> {
        let tracked = self.git(&[
            "--no-optional-locks",
            "diff",
            "--name-status",
            "--no-renames",
            "HEAD",
        ])?;
        let mut changes = parse_name_status(&tracked, &self.ignore_prefixes);

        let untracked = self.git(&[
            "--no-optional-locks",
            "ls-files",
            "--others",
            "--exclude-standard",
        ])?;
        changes.extend(
            untracked
                .lines()
                .filter(|path| !path.is_empty())
                .filter(|path| !self.ignore_prefixes.iter().any(|p| path.starts_with(p.as_str())))
                .map(|path| FileChange::new(FileAction::Added, path)),
        );

        if with_content {
            self.load_content(&mut changes)?;
        }
        Ok(changes)
    }

    /// Content of `path` in the last baseline, or `None` when the baseline
    /// does not hold it.
    pub fn baseline_content(&self, path: &str) -> Result<Option<String>, ChangeSetError> {
        let spec = format!("HEAD:{path}");
        match self.git(&["--no-optional-locks", "show", &spec]) {
            Ok(content) => Ok(Some(content)),
            Err(ChangeSetError::Git { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Record the current tree as the new baseline.
    pub fn commit(&self, message: &str) -> Result<(), ChangeSetError> {
        if message.trim().is_empty() {
            return Err(ChangeSetError::EmptyMessage);
        }
        self.stage_and_commit(message)
    }

    /// Attach current content to every non-deleted change. Files that are
    /// not valid UTF-8 fail the whole load.
    fn load_content(&self, changes: &mut [FileChange]) -> Result<(), ChangeSetError> {
        for change in changes
            .iter_mut()
            .filter(|c| c.action != FileAction::Deleted)
        {
            let path = self.root.join(&change.path);
            let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            change.content = String::from_utf8(bytes)
                .map_err(|_| ChangeSetError::NotText { path: path.clone() })?;
        }
        Ok(())
    }

    fn stage_and_commit(&self, message: &str) -> Result<(), ChangeSetError> {
        self.git(&["add", "--all"])?;
        self.git(&["commit", "--quiet", "--allow-empty", "--no-verify", "-m", message])?;
        Ok(())
    }

    /// Run one git command in the tree and return its stdout.
    fn git(&self, args: &[&str]) -> Result<String, ChangeSetError> {
        let output = Command::new(GIT)
            .arg("-c")
            .arg("core.quotepath=false")
            .arg("-c")
            .arg(format!("user.name={AUTHOR_NAME}"))
            .arg("-c")
            .arg(format!("user.email={AUTHOR_EMAIL}"))
            .arg("-c")
            .arg("commit.gpgsign=false")
            .args(args)
            .current_dir(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| io_err(&self.root, e))?;

        if !output.status.success() {
            return Err(ChangeSetError::Git {
                args: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
