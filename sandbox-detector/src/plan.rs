//! Reload plan derivation.

use serde::Serialize;

use sandbox_core::FileChange;

/// Which pipeline stages a deploy needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReloadPlan {
    pub rebuild: bool,
    pub relaunch: bool,
}

impl ReloadPlan {
    /// Rebuild when dependencies changed. Relaunch when anything changed, and
    /// always after a rebuild: the reload worker stops every process before
    /// rebuilding, so a rebuild alone would leave nothing running.
    pub fn derive(dependencies_changed: bool, changes: &[FileChange]) -> Self {
        let rebuild = dependencies_changed;
        Self {
            rebuild,
            relaunch: rebuild || !changes.is_empty(),
        }
    }

    pub fn is_noop(&self) -> bool {
        !self.rebuild && !self.relaunch
    }
}
