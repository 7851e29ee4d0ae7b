//! Converge a running supervisor to a freshly written configuration.
//!
//! ```text
//! ensure_running ─▶ reloadConfig ─▶ stop+remove (changed ∪ removed)
//!                                  ─▶ add       (added ∪ changed)
//! ```
//!
//! Not atomic: the first failing call aborts and earlier calls stay applied.
//! Re-running is safe because stopping an unknown or stopped group, removing
//! an unknown group, and adding a present group are tolerated.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Serialize;

use sandbox_core::SupervisorSettings;

use crate::error::{supervisor_io, SupervisorError};
use crate::rpc::{faults, ConfigDiff, SupervisorRpc};

/// Starts the supervisor daemon.
pub trait Launch: Send + Sync {
    fn launch(&self) -> Result<(), SupervisorError>;
}

/// Runs `<binary> -c <config>`; supervisord daemonizes and the parent exits.
#[derive(Debug, Clone)]
pub struct SupervisordLauncher {
    binary: PathBuf,
    config: PathBuf,
}

impl SupervisordLauncher {
    pub fn new(binary: impl Into<PathBuf>, config: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            config: config.into(),
        }
    }

    pub fn from_settings(settings: &SupervisorSettings) -> Self {
        Self::new(&settings.binary, settings.config_path())
    }
}

impl Launch for SupervisordLauncher {
    fn launch(&self) -> Result<(), SupervisorError> {
        tracing::info!(
            "starting {} -c {}",
            self.binary.display(),
            self.config.display()
        );
        let output = Command::new(&self.binary)
            .arg("-c")
            .arg(&self.config)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| supervisor_io(&self.binary, e))?;
        if !output.status.success() {
            return Err(SupervisorError::LaunchFailed {
                binary: self.binary.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// What a reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub diff: ConfigDiff,
    pub stopped: Vec<String>,
    pub started: Vec<String>,
    /// Desired groups whose definition did not change, started in place.
    pub resumed: Vec<String>,
}

impl Reconciliation {
    /// No group definition was stopped, removed or added.
    pub fn is_noop(&self) -> bool {
        self.stopped.is_empty() && self.started.is_empty()
    }
}

/// Drives a supervisor through [`SupervisorRpc`], launching it via [`Launch`]
/// when it is not reachable.
pub struct Reconciler {
    rpc: Box<dyn SupervisorRpc>,
    launcher: Box<dyn Launch>,
    ready_attempts: u32,
    ready_backoff: Duration,
}

impl Reconciler {
    pub fn new(rpc: Box<dyn SupervisorRpc>, launcher: Box<dyn Launch>) -> Self {
        let defaults = SupervisorSettings::default();
        Self {
            rpc,
            launcher,
            ready_attempts: defaults.ready_attempts,
            ready_backoff: Duration::from_millis(defaults.ready_backoff_ms),
        }
    }

    /// XML-RPC client and `supervisord` launcher built from `settings`.
    pub fn from_settings(settings: &SupervisorSettings) -> Self {
        Self::new(
            Box::new(crate::rpc::SupervisorClient::from_settings(settings)),
            Box::new(SupervisordLauncher::from_settings(settings)),
        )
        .with_readiness(
            settings.ready_attempts,
            Duration::from_millis(settings.ready_backoff_ms),
        )
    }

    /// Poll `attempts` times, starting at `backoff` and doubling.
    pub fn with_readiness(mut self, attempts: u32, backoff: Duration) -> Self {
        self.ready_attempts = attempts;
        self.ready_backoff = backoff;
        self
    }

    pub fn rpc(&self) -> &dyn SupervisorRpc {
        self.rpc.as_ref()
    }

    /// Make sure the daemon answers `getState` with `RUNNING`.
    pub fn ensure_running(&self) -> Result<(), SupervisorError> {
        match self.rpc.get_state() {
            Ok(state) if state.is_running() => return Ok(()),
            Ok(state) => tracing::debug!("supervisor is {}, waiting", state.name),
            Err(err) => {
                tracing::info!("supervisor not reachable ({err}), launching");
                self.launcher.launch()?;
            }
        }

        let mut delay = self.ready_backoff;
        for attempt in 1..=self.ready_attempts {
            std::thread::sleep(delay);
            match self.rpc.get_state() {
                Ok(state) if state.is_running() => {
                    tracing::debug!("supervisor ready after {attempt} poll(s)");
                    return Ok(());
                }
                Ok(state) => tracing::debug!("poll {attempt}: supervisor is {}", state.name),
                Err(err) => tracing::debug!("poll {attempt}: {err}"),
            }
            delay = delay.saturating_mul(2);
        }
        Err(SupervisorError::NotReady {
            attempts: self.ready_attempts,
        })
    }

    /// Load the config on disk and converge the live process groups to it.
    ///
    /// `desired` names every group the config declares. Groups the reload
    /// left untouched are started as well, so processes stopped earlier in
    /// the same reload come back up.
    pub fn reconcile(&self, desired: &[&str]) -> Result<Reconciliation, SupervisorError> {
        self.ensure_running()?;
        let diff = self.rpc.reload_config()?;
        tracing::info!(
            "supervisor config diff: added={:?} changed={:?} removed={:?}",
            diff.added,
            diff.changed,
            diff.removed
        );

        let mut report = Reconciliation::default();
        for name in diff.changed.iter().chain(&diff.removed) {
            expect_true(
                "supervisor.stopProcessGroup",
                name,
                tolerate(
                    self.rpc.stop_process_group(name),
                    &[faults::BAD_NAME, faults::NOT_RUNNING],
                ),
            )?;
            expect_true(
                "supervisor.removeProcessGroup",
                name,
                tolerate(self.rpc.remove_process_group(name), &[faults::BAD_NAME]),
            )?;
            report.stopped.push(name.clone());
        }
        for name in diff.added.iter().chain(&diff.changed) {
            expect_true(
                "supervisor.addProcessGroup",
                name,
                tolerate(self.rpc.add_process_group(name), &[faults::ALREADY_ADDED]),
            )?;
            report.started.push(name.clone());
        }
        for name in desired {
            if report.started.iter().any(|started| started == name) {
                continue;
            }
            expect_true(
                "supervisor.startProcessGroup",
                name,
                tolerate(
                    self.rpc.start_process_group(name),
                    &[faults::ALREADY_STARTED],
                ),
            )?;
            report.resumed.push(name.to_string());
        }

        report.diff = diff;
        Ok(report)
    }

    /// Stop every managed process. Returns `false` when no supervisor was
    /// reachable, which means nothing was running.
    pub fn stop_all(&self) -> Result<bool, SupervisorError> {
        if let Err(err) = self.rpc.get_state() {
            if err.is_unreachable() {
                tracing::debug!("supervisor not reachable, nothing to stop: {err}");
                return Ok(false);
            }
            return Err(err);
        }
        expect_true(
            "supervisor.stopAllProcesses",
            "*",
            self.rpc.stop_all_processes(),
        )?;
        Ok(true)
    }

    /// Restart the supervisor daemon in place.
    pub fn restart(&self) -> Result<(), SupervisorError> {
        expect_true("supervisor.restart", "*", self.rpc.restart())
    }
}

fn tolerate(
    result: Result<bool, SupervisorError>,
    codes: &[i64],
) -> Result<bool, SupervisorError> {
    match result {
        Err(err) if err.fault_code().is_some_and(|code| codes.contains(&code)) => {
            tracing::debug!("tolerated: {err}");
            Ok(true)
        }
        other => other,
    }
}

fn expect_true(
    method: &str,
    name: &str,
    result: Result<bool, SupervisorError>,
) -> Result<(), SupervisorError> {
    if result? {
        Ok(())
    } else {
        Err(SupervisorError::Rejected {
            method: method.to_string(),
            name: name.to_string(),
        })
    }
}
