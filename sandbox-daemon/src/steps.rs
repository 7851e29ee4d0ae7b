//! Reload steps and the per-event log they write to.
//!
//! Every line a step produces goes to two sinks: the daemon's operational
//! log (`tracing`, one target per stage) and the event's durable log in the
//! result store.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use sandbox_core::{EventId, ResultStore, SandboxConfig};
use sandbox_detector::read_procfile;
use sandbox_supervisor::{ConfigRenderer, Reconciler, SupervisorConfig};

use crate::error::{step_io, DaemonError, StepError};

/// Which part of a reload a log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reload,
    Build,
    Relaunch,
}

/// Append-only log of one reload event, owned by the worker while the event
/// is in flight.
pub struct EventLog {
    id: EventId,
    sink: Option<Box<dyn Write + Send>>,
}

impl EventLog {
    /// Open the event's durable log. If the store cannot open it the event
    /// still runs, logging to `tracing` only.
    pub fn open(store: &ResultStore, id: &EventId) -> Self {
        let sink = match store.log_writer(id) {
            Ok(file) => Some(Box::new(file) as Box<dyn Write + Send>),
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "cannot open event log");
                None
            }
        };
        Self {
            id: id.clone(),
            sink,
        }
    }

    /// Log to `sink` only; used by tests and tools that capture output.
    pub fn to_writer(id: &EventId, sink: Box<dyn Write + Send>) -> Self {
        Self {
            id: id.clone(),
            sink: Some(sink),
        }
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn line(&mut self, stage: Stage, line: &str) {
        match stage {
            Stage::Reload => tracing::info!(target: "sandbox::reload", id = %self.id, "{line}"),
            Stage::Build => tracing::info!(target: "sandbox::build", id = %self.id, "{line}"),
            Stage::Relaunch => {
                tracing::info!(target: "sandbox::relaunch", id = %self.id, "{line}")
            }
        }
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = writeln!(sink, "{line}").and_then(|()| sink.flush()) {
                tracing::warn!(id = %self.id, error = %err, "event log write failed");
            }
        }
    }
}

/// The three operations a reload sequences. Implementations block; the
/// worker runs them off the async runtime.
pub trait ReloadSteps: Send + Sync {
    fn stop_all(&self, log: &mut EventLog) -> Result<(), StepError>;
    fn rebuild(&self, log: &mut EventLog) -> Result<(), StepError>;
    fn relaunch(&self, log: &mut EventLog) -> Result<(), StepError>;
}

/// Production steps: supervisord for process control, the configured build
/// argv for rebuilds.
pub struct SandboxSteps {
    config: SandboxConfig,
    renderer: ConfigRenderer,
    reconciler: Reconciler,
}

impl SandboxSteps {
    pub fn new(config: SandboxConfig) -> Result<Self, DaemonError> {
        let renderer = ConfigRenderer::new(config.supervisor.template_dir.as_deref())?;
        let reconciler = Reconciler::from_settings(&config.supervisor);
        Ok(Self {
            config,
            renderer,
            reconciler,
        })
    }
}

impl ReloadSteps for SandboxSteps {
    fn stop_all(&self, log: &mut EventLog) -> Result<(), StepError> {
        if self.reconciler.stop_all()? {
            log.line(Stage::Reload, "stopped all processes");
        } else {
            log.line(Stage::Reload, "supervisor not running, nothing to stop");
        }
        Ok(())
    }

    fn rebuild(&self, log: &mut EventLog) -> Result<(), StepError> {
        if self.config.build_command.is_empty() {
            log.line(Stage::Build, "no build command configured, skipping rebuild");
            return Ok(());
        }
        run_logged(
            &self.config.build_command,
            &self.config.app_dir,
            Stage::Build,
            log,
        )
    }

    fn relaunch(&self, log: &mut EventLog) -> Result<(), StepError> {
        let settings = &self.config.supervisor;
        let procfile = self.config.procfile_path();
        let processes = read_procfile(&procfile)?;
        log.line(
            Stage::Relaunch,
            &format!("{} process type(s) in {}", processes.len(), procfile.display()),
        );

        let desired = SupervisorConfig::build(
            settings,
            &processes,
            &self.config.environment,
            &self.config.app_dir,
        )?;
        let path = settings.config_path();
        self.renderer.write(&desired, &path)?;
        log.line(Stage::Relaunch, &format!("wrote {}", path.display()));

        let report = self.reconciler.reconcile(&desired.group_names())?;
        if report.is_noop() {
            log.line(Stage::Relaunch, "process groups unchanged");
        }
        for name in &report.stopped {
            log.line(Stage::Relaunch, &format!("stopped {name}"));
        }
        for name in &report.started {
            log.line(Stage::Relaunch, &format!("started {name}"));
        }
        for name in &report.resumed {
            log.line(Stage::Relaunch, &format!("resumed {name}"));
        }
        Ok(())
    }
}

/// Run `argv` in `dir`, streaming stdout and stderr into `log` line by line.
/// The exit status is the only success signal.
pub fn run_logged(
    argv: &[String],
    dir: &Path,
    stage: Stage,
    log: &mut EventLog,
) -> Result<(), StepError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(StepError::CommandFailed {
            program: String::new(),
            status: "empty command".to_string(),
        });
    };
    log.line(stage, &format!("$ {}", argv.join(" ")));

    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| step_io(program, e))?;

    let pipes: Vec<Box<dyn Read + Send>> = [
        child.stdout.take().map(|p| Box::new(p) as Box<dyn Read + Send>),
        child.stderr.take().map(|p| Box::new(p) as Box<dyn Read + Send>),
    ]
    .into_iter()
    .flatten()
    .collect();

    let (tx, rx) = std::sync::mpsc::channel::<String>();
    std::thread::scope(|scope| {
        for pipe in pipes {
            let tx = tx.clone();
            scope.spawn(move || {
                for chunk in BufReader::new(pipe).split(b'\n').map_while(Result::ok) {
                    let line = String::from_utf8_lossy(&chunk);
                    if tx.send(line.trim_end_matches('\r').to_string()).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);
        for line in rx {
            log.line(stage, &line);
        }
    });

    let status = child.wait().map_err(|e| step_io(program, e))?;
    if !status.success() {
        return Err(StepError::CommandFailed {
            program: program.clone(),
            status: status.to_string(),
        });
    }
    Ok(())
}
