//! Deploy staging: swap a new source tree into the app directory and work
//! out what the reload has to do.
//!
//! Hidden top-level entries of the app directory (`.git`, caches, local
//! state) survive every deploy; everything else is replaced by the
//! non-hidden entries of the source tree.
//!
//! The tracker baseline only moves when a reload succeeds, so every plan is
//! derived against the last tree that was running successfully. Retrying a
//! failed deploy therefore repeats its rebuild.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sandbox_changeset::Tracker;
use sandbox_core::{EventId, FileChange, SandboxConfig};
use sandbox_detector::{manifests_changed, ReloadPlan};

use crate::error::{io_err, DaemonError};

/// Reply to an accepted deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReceipt {
    pub id: EventId,
    pub rebuild: bool,
    pub relaunch: bool,
    /// Number of changed paths since the last successful deploy.
    pub changes: usize,
}

/// Outcome of staging a source tree, before handoff.
#[derive(Debug, Clone)]
pub struct StagedDeploy {
    pub plan: ReloadPlan,
    pub changes: Vec<FileChange>,
}

/// Blocking deploy operations on the app directory. Callers serialize them.
#[derive(Debug, Clone)]
pub struct Deployer {
    app_dir: PathBuf,
    manifests: Vec<String>,
    tracker: Tracker,
}

impl Deployer {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            app_dir: config.app_dir.clone(),
            manifests: config.manifests.clone(),
            tracker: Tracker::new(&config.app_dir, config.ignore_prefixes.clone()),
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Replace the app tree with `source` and derive the reload plan.
    ///
    /// The tracker is prepared before the swap so the very first deploy
    /// diffs against the previous (possibly empty) tree. Manifests are
    /// compared against their baseline content, not against whatever the
    /// app directory held before this call.
    pub fn stage(&self, source: &Path) -> Result<StagedDeploy, DaemonError> {
        self.check_source(source)?;
        self.tracker.prepare()?;

        replace_tree(&self.app_dir, source)?;
        let changes = self.tracker.diff(false)?;
        let deps_changed = manifests_changed(
            &changes,
            &self.manifests,
            |path| match self.tracker.baseline_content(path) {
                Ok(content) => content,
                Err(err) => {
                    tracing::warn!(path, error = %err, "cannot read baseline manifest");
                    None
                }
            },
            |path| fs::read_to_string(self.app_dir.join(path)).ok(),
        );
        let plan = ReloadPlan::derive(deps_changed, &changes);

        tracing::info!(
            source = %source.display(),
            changes = changes.len(),
            rebuild = plan.rebuild,
            relaunch = plan.relaunch,
            "deploy staged",
        );
        Ok(StagedDeploy { plan, changes })
    }

    /// Record the staged tree as the new baseline. Called once the reload
    /// for `id` succeeded.
    pub fn commit(&self, id: &EventId) -> Result<(), DaemonError> {
        self.tracker.commit(&format!("deploy {id}"))?;
        Ok(())
    }

    fn check_source(&self, source: &Path) -> Result<(), DaemonError> {
        let invalid = |reason: &str| DaemonError::InvalidSource {
            path: source.to_path_buf(),
            reason: reason.to_string(),
        };
        let source = fs::canonicalize(source).map_err(|e| io_err(source, e))?;
        if !source.is_dir() {
            return Err(invalid("not a directory"));
        }
        if let Ok(app) = fs::canonicalize(&self.app_dir) {
            if source.starts_with(&app) || app.starts_with(&source) {
                return Err(invalid("overlaps the app directory"));
            }
        }
        Ok(())
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Remove every non-hidden top-level entry of `target`, then copy every
/// non-hidden top-level entry of `source` into it.
pub fn replace_tree(target: &Path, source: &Path) -> Result<(), DaemonError> {
    fs::create_dir_all(target).map_err(|e| io_err(target, e))?;

    for entry in fs::read_dir(target).map_err(|e| io_err(target, e))? {
        let entry = entry.map_err(|e| io_err(target, e))?;
        if is_hidden(&entry.file_name()) {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
        let removed = if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| io_err(&path, e))?;
    }

    for entry in fs::read_dir(source).map_err(|e| io_err(source, e))? {
        let entry = entry.map_err(|e| io_err(source, e))?;
        if is_hidden(&entry.file_name()) {
            continue;
        }
        copy_entry(&entry.path(), &target.join(entry.file_name()))?;
    }
    Ok(())
}

fn copy_entry(from: &Path, to: &Path) -> Result<(), DaemonError> {
    let meta = fs::symlink_metadata(from).map_err(|e| io_err(from, e))?;
    let file_type = meta.file_type();

    if file_type.is_symlink() {
        let link = fs::read_link(from).map_err(|e| io_err(from, e))?;
        std::os::unix::fs::symlink(&link, to).map_err(|e| io_err(to, e))?;
    } else if file_type.is_dir() {
        fs::create_dir_all(to).map_err(|e| io_err(to, e))?;
        for entry in fs::read_dir(from).map_err(|e| io_err(from, e))? {
            let entry = entry.map_err(|e| io_err(from, e))?;
            copy_entry(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        fs::copy(from, to).map_err(|e| io_err(from, e))?;
    }
    Ok(())
}
