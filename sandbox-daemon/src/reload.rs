//! Reload manager: a single worker running one event at a time.
//!
//! ```text
//! Processing ─▶ stop-all ─▶ [rebuild] ─▶ [relaunch] ─▶ Success
//!                  │            │             │
//!                  └────────────┴─────────────┴──▶ Failed
//! ```
//!
//! Handoff is single-slot and non-blocking: [`ReloadManager::submit`] takes
//! the only permit of a one-permit semaphore or fails with
//! [`SubmitError::Busy`]. The permit travels with the event and is released
//! once the event's terminal status is written.
//!
//! An event may carry an [`OnSuccess`] hook. It runs on the worker after
//! every step succeeded and before `Success` is recorded, while the slot is
//! still held.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};

use sandbox_core::{EventId, ReloadEvent, ReloadStatus, ResultStore};

use crate::error::StepError;
use crate::steps::{EventLog, ReloadSteps, Stage};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("reload in progress, try again later")]
    Busy,
    #[error("reload worker has shut down")]
    Closed,
}

/// Work to run once an event's steps all succeeded.
pub type OnSuccess = Box<dyn FnOnce(&mut EventLog) -> Result<(), StepError> + Send>;

struct Job {
    event: ReloadEvent,
    on_success: Option<OnSuccess>,
    _permit: OwnedSemaphorePermit,
}

/// Producer side of the handoff. Cheap to clone.
#[derive(Clone)]
pub struct ReloadManager {
    permits: Arc<Semaphore>,
    tx: mpsc::Sender<Job>,
    store: Arc<ResultStore>,
}

/// Consumer side; drive it with [`ReloadWorker::run`].
pub struct ReloadWorker {
    rx: mpsc::Receiver<Job>,
    store: Arc<ResultStore>,
    steps: Arc<dyn ReloadSteps>,
}

impl ReloadManager {
    pub fn new(store: Arc<ResultStore>, steps: Arc<dyn ReloadSteps>) -> (Self, ReloadWorker) {
        let (tx, rx) = mpsc::channel(1);
        let manager = Self {
            permits: Arc::new(Semaphore::new(1)),
            tx,
            store: store.clone(),
        };
        (manager, ReloadWorker { rx, store, steps })
    }

    /// Whether an event is in flight.
    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// Hand `event` to the worker without waiting.
    ///
    /// On acceptance the event is recorded as `Processing` before this
    /// returns, so a query right after a successful submit never sees
    /// `Unknown`.
    pub fn submit(&self, event: ReloadEvent) -> Result<(), SubmitError> {
        self.submit_with(event, None)
    }

    /// [`ReloadManager::submit`] with a hook run only if the event succeeds.
    pub fn submit_with(
        &self,
        event: ReloadEvent,
        on_success: Option<OnSuccess>,
    ) -> Result<(), SubmitError> {
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| SubmitError::Busy)?;

        write_status(&self.store, &event.id, ReloadStatus::Processing);
        tracing::info!(
            id = %event.id,
            rebuild = event.rebuild,
            relaunch = event.relaunch,
            "reload accepted",
        );

        let id = event.id.clone();
        self.tx
            .try_send(Job {
                event,
                on_success,
                _permit: permit,
            })
            .map_err(|_| {
                write_status(&self.store, &id, ReloadStatus::Failed);
                SubmitError::Closed
            })
    }

    /// Wait until no event is in flight.
    pub async fn wait_idle(&self) {
        let _ = self.permits.acquire().await;
    }
}

impl ReloadWorker {
    /// Process events until shutdown or until every manager is dropped.
    /// Shutdown is observed between events only.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                job = self.rx.recv() => {
                    let Some(job) = job else { break };
                    process(self.store.clone(), self.steps.clone(), job).await;
                }
            }
        }
        tracing::debug!("reload worker stopped");
    }
}

async fn process(store: Arc<ResultStore>, steps: Arc<dyn ReloadSteps>, job: Job) -> ReloadStatus {
    let Job {
        event,
        on_success,
        _permit,
    } = job;
    let id = event.id.clone();
    let task_store = store.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        execute_with(&task_store, steps.as_ref(), &event, on_success)
    })
    .await;
    match outcome {
        Ok(status) => status,
        Err(err) => {
            tracing::error!(id = %id, error = %err, "reload task aborted");
            let mut log = EventLog::open(&store, &id);
            log.line(Stage::Reload, &StepError::Internal(err.to_string()).to_string());
            write_status(&store, &id, ReloadStatus::Failed);
            ReloadStatus::Failed
        }
    }
}

/// Run one event's steps to a terminal status and persist it. Blocking.
pub fn execute(store: &ResultStore, steps: &dyn ReloadSteps, event: &ReloadEvent) -> ReloadStatus {
    execute_with(store, steps, event, None)
}

/// [`execute`], running `on_success` between the last step and recording
/// `Success`. A failing hook is logged; the event still succeeds.
pub fn execute_with(
    store: &ResultStore,
    steps: &dyn ReloadSteps,
    event: &ReloadEvent,
    on_success: Option<OnSuccess>,
) -> ReloadStatus {
    let mut log = EventLog::open(store, &event.id);
    log.line(
        Stage::Reload,
        &format!(
            "reload {} started (rebuild={}, relaunch={})",
            event.id, event.rebuild, event.relaunch
        ),
    );

    let status = match run_steps(steps, event, &mut log) {
        Ok(()) => {
            if let Some(hook) = on_success {
                if let Err(err) = hook(&mut log) {
                    log.line(Stage::Reload, &format!("warning: {err}"));
                }
            }
            ReloadStatus::Success
        }
        Err(err) => {
            log.line(Stage::Reload, &format!("error: {err}"));
            ReloadStatus::Failed
        }
    };
    log.line(Stage::Reload, &format!("reload {} {}", event.id, status));
    write_status(store, &event.id, status);
    status
}

fn run_steps(
    steps: &dyn ReloadSteps,
    event: &ReloadEvent,
    log: &mut EventLog,
) -> Result<(), StepError> {
    steps.stop_all(log)?;
    if event.rebuild {
        log.line(Stage::Build, "rebuilding");
        steps.rebuild(log)?;
    }
    if event.relaunch {
        log.line(Stage::Relaunch, "relaunching");
        steps.relaunch(log)?;
    }
    Ok(())
}

fn write_status(store: &ResultStore, id: &EventId, status: ReloadStatus) {
    if let Err(err) = store.write_status(id, status) {
        tracing::error!(id = %id, status = %status, error = %err, "failed to record reload status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Records step calls; fails the named step; optionally blocks every
    /// step on a gate until the test releases it.
    #[derive(Default)]
    struct FakeSteps {
        calls: Mutex<Vec<&'static str>>,
        fail: Option<&'static str>,
        gate: Option<Mutex<std::sync::mpsc::Receiver<()>>>,
    }

    impl FakeSteps {
        fn failing(step: &'static str) -> Self {
            Self {
                fail: Some(step),
                ..Self::default()
            }
        }

        fn gated() -> (Self, std::sync::mpsc::Sender<()>) {
            let (tx, rx) = std::sync::mpsc::channel();
            let steps = Self {
                gate: Some(Mutex::new(rx)),
                ..Self::default()
            };
            (steps, tx)
        }

        fn step(&self, name: &'static str, log: &mut EventLog) -> Result<(), StepError> {
            if let Some(gate) = &self.gate {
                let _ = gate.lock().unwrap().recv();
            }
            self.calls.lock().unwrap().push(name);
            log.line(Stage::Reload, &format!("{name} output"));
            if self.fail == Some(name) {
                return Err(StepError::CommandFailed {
                    program: name.to_string(),
                    status: "exit status: 1".to_string(),
                });
            }
            Ok(())
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ReloadSteps for FakeSteps {
        fn stop_all(&self, log: &mut EventLog) -> Result<(), StepError> {
            self.step("stop_all", log)
        }
        fn rebuild(&self, log: &mut EventLog) -> Result<(), StepError> {
            self.step("rebuild", log)
        }
        fn relaunch(&self, log: &mut EventLog) -> Result<(), StepError> {
            self.step("relaunch", log)
        }
    }

    fn store() -> (TempDir, Arc<ResultStore>) {
        let dir = TempDir::new().expect("tempdir");
        let store = ResultStore::open(dir.path().join("results")).expect("store");
        (dir, Arc::new(store))
    }

    #[test]
    fn full_sequence_succeeds_in_order() {
        let (_dir, store) = store();
        let steps = FakeSteps::default();
        let event = ReloadEvent::new(true, true);

        assert_eq!(execute(&store, &steps, &event), ReloadStatus::Success);
        assert_eq!(steps.calls(), vec!["stop_all", "rebuild", "relaunch"]);
        assert_eq!(store.read_status(&event.id).unwrap(), ReloadStatus::Success);

        let log = store.read_log(&event.id).unwrap();
        assert!(log.contains("rebuild output"));
        assert!(log.contains("relaunch output"));
    }

    #[test]
    fn failed_rebuild_skips_relaunch() {
        let (_dir, store) = store();
        let steps = FakeSteps::failing("rebuild");
        let event = ReloadEvent::new(true, true);

        assert_eq!(execute(&store, &steps, &event), ReloadStatus::Failed);
        assert_eq!(steps.calls(), vec!["stop_all", "rebuild"]);
        let log = store.read_log(&event.id).unwrap();
        assert!(log.contains("error: rebuild exited with exit status: 1"));
    }

    #[test]
    fn failed_stop_fails_the_event() {
        let (_dir, store) = store();
        let steps = FakeSteps::failing("stop_all");
        let event = ReloadEvent::new(false, true);
        assert_eq!(execute(&store, &steps, &event), ReloadStatus::Failed);
        assert_eq!(steps.calls(), vec!["stop_all"]);
    }

    #[test]
    fn noop_event_still_stops_and_succeeds() {
        let (_dir, store) = store();
        let steps = FakeSteps::default();
        let event = ReloadEvent::new(false, false);
        assert_eq!(execute(&store, &steps, &event), ReloadStatus::Success);
        assert_eq!(steps.calls(), vec!["stop_all"]);
    }

    #[test]
    fn relaunch_only_skips_rebuild() {
        let (_dir, store) = store();
        let steps = FakeSteps::default();
        execute(&store, &steps, &ReloadEvent::new(false, true));
        assert_eq!(steps.calls(), vec!["stop_all", "relaunch"]);
    }

    fn hook(ran: &Arc<Mutex<bool>>) -> Option<OnSuccess> {
        let ran = ran.clone();
        Some(Box::new(move |log: &mut EventLog| {
            *ran.lock().unwrap() = true;
            log.line(Stage::Reload, "hook ran");
            Ok(())
        }))
    }

    #[test]
    fn success_hook_runs_before_success_is_recorded() {
        let (_dir, store) = store();
        let ran = Arc::new(Mutex::new(false));
        let event = ReloadEvent::new(false, true);

        let status = execute_with(&store, &FakeSteps::default(), &event, hook(&ran));
        assert_eq!(status, ReloadStatus::Success);
        assert!(*ran.lock().unwrap());
        let log = store.read_log(&event.id).unwrap();
        let hook_at = log.find("hook ran").expect("hook logged");
        let done_at = log.find("Success").expect("terminal line");
        assert!(hook_at < done_at);
    }

    #[test]
    fn success_hook_is_skipped_on_failure() {
        let (_dir, store) = store();
        let ran = Arc::new(Mutex::new(false));
        let event = ReloadEvent::new(true, true);

        let status = execute_with(&store, &FakeSteps::failing("rebuild"), &event, hook(&ran));
        assert_eq!(status, ReloadStatus::Failed);
        assert!(!*ran.lock().unwrap());
    }

    #[test]
    fn failing_success_hook_is_only_a_warning() {
        let (_dir, store) = store();
        let event = ReloadEvent::new(false, false);
        let failing: OnSuccess =
            Box::new(|_: &mut EventLog| Err(StepError::Internal("no baseline".into())));

        let status = execute_with(&store, &FakeSteps::default(), &event, Some(failing));
        assert_eq!(status, ReloadStatus::Success);
        assert!(store.read_log(&event.id).unwrap().contains("warning: "));
    }

    #[tokio::test]
    async fn second_submit_is_rejected_while_busy() {
        let (_dir, store) = store();
        let (steps, release) = FakeSteps::gated();
        let steps = Arc::new(steps);
        let (manager, worker) = ReloadManager::new(store.clone(), steps.clone());
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

        let first = ReloadEvent::new(false, true);
        manager.submit(first.clone()).expect("first accepted");
        assert_eq!(store.read_status(&first.id).unwrap(), ReloadStatus::Processing);
        assert!(manager.is_busy());

        let second = ReloadEvent::new(false, true);
        assert!(matches!(manager.submit(second.clone()), Err(SubmitError::Busy)));
        assert_eq!(
            store.status_or_unknown(&second.id).unwrap(),
            ReloadStatus::Unknown
        );

        release.send(()).unwrap();
        release.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(10), manager.wait_idle())
            .await
            .expect("worker finished");
        assert_eq!(store.read_status(&first.id).unwrap(), ReloadStatus::Success);

        let third = ReloadEvent::new(false, false);
        manager.submit(third.clone()).expect("accepted after idle");
        release.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(10), manager.wait_idle())
            .await
            .expect("worker finished");
        assert_eq!(store.read_status(&third.id).unwrap(), ReloadStatus::Success);

        let _ = shutdown_tx.send(());
        handle.await.expect("worker join");
    }

    #[tokio::test]
    async fn worker_records_failure_and_frees_the_slot() {
        let (_dir, store) = store();
        let steps = Arc::new(FakeSteps::failing("relaunch"));
        let (manager, worker) = ReloadManager::new(store.clone(), steps);
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

        let event = ReloadEvent::new(false, true);
        manager.submit(event.clone()).expect("accepted");
        tokio::time::timeout(Duration::from_secs(10), manager.wait_idle())
            .await
            .expect("worker finished");

        assert_eq!(store.read_status(&event.id).unwrap(), ReloadStatus::Failed);
        assert!(!manager.is_busy());

        let _ = shutdown_tx.send(());
        handle.await.expect("worker join");
    }

    #[tokio::test]
    async fn submit_after_worker_exit_is_closed() {
        let (_dir, store) = store();
        let (manager, worker) = ReloadManager::new(store.clone(), Arc::new(FakeSteps::default()));
        drop(worker);

        let event = ReloadEvent::new(false, false);
        assert!(matches!(manager.submit(event.clone()), Err(SubmitError::Closed)));
        assert_eq!(store.read_status(&event.id).unwrap(), ReloadStatus::Failed);
        assert!(!manager.is_busy());
    }
}
