//! Sandbox daemon: reload worker, deploy path and Unix-socket server.

pub mod deploy;
mod error;
pub mod paths;
pub mod protocol;
pub mod reload;
mod runtime;
pub mod steps;

pub use deploy::{DeployReceipt, Deployer, StagedDeploy};
pub use error::{DaemonError, StepError};
pub use protocol::{
    request_deploy, request_result, request_status, request_stop, send_request, DaemonRequest,
    DaemonResponse,
};
pub use reload::{execute, execute_with, OnSuccess, ReloadManager, ReloadWorker, SubmitError};
pub use runtime::{run, serve, start_blocking};
pub use steps::{EventLog, ReloadSteps, SandboxSteps, Stage};
