//! Supervisor XML-RPC surface.
//!
//! [`SupervisorRpc`] is the seam the reconciler and the reload worker talk
//! through; [`SupervisorClient`] implements it over HTTP with `ureq`.

use std::time::Duration;

use serde::Serialize;

use sandbox_core::SupervisorSettings;

use crate::error::SupervisorError;
use crate::xmlrpc::{decode_response, encode_call, Response, Value};

/// supervisord fault codes the reconciler cares about.
pub mod faults {
    pub const BAD_NAME: i64 = 10;
    pub const ALREADY_STARTED: i64 = 60;
    pub const NOT_RUNNING: i64 = 70;
    pub const ALREADY_ADDED: i64 = 90;
}

/// Per-process status in group stop/start results meaning success.
const STATUS_SUCCESS: i64 = 80;

/// Daemon state as reported by `supervisor.getState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorState {
    pub code: i64,
    pub name: String,
}

impl SupervisorState {
    pub fn running() -> Self {
        Self {
            code: 1,
            name: "RUNNING".to_string(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.name == "RUNNING"
    }
}

/// Group names `supervisor.reloadConfig` reports relative to the previously
/// loaded configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

/// Operations the sandbox needs from a running supervisor.
///
/// Boolean results carry the supervisor's own verdict; transport failures
/// and faults are errors.
pub trait SupervisorRpc: Send + Sync {
    fn get_state(&self) -> Result<SupervisorState, SupervisorError>;
    fn reload_config(&self) -> Result<ConfigDiff, SupervisorError>;
    fn add_process_group(&self, name: &str) -> Result<bool, SupervisorError>;
    fn remove_process_group(&self, name: &str) -> Result<bool, SupervisorError>;
    fn stop_process_group(&self, name: &str) -> Result<bool, SupervisorError>;
    fn start_process_group(&self, name: &str) -> Result<bool, SupervisorError>;
    fn stop_all_processes(&self) -> Result<bool, SupervisorError>;
    fn restart(&self) -> Result<bool, SupervisorError>;
}

/// XML-RPC client for `http://127.0.0.1:<port>/RPC2`.
pub struct SupervisorClient {
    url: String,
    agent: ureq::Agent,
}

impl SupervisorClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn from_settings(settings: &SupervisorSettings) -> Self {
        Self::new(
            settings.rpc_url(),
            Duration::from_millis(settings.rpc_timeout_ms),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn call(&self, method: &str, params: &[Value]) -> Result<Value, SupervisorError> {
        let http_err = |message: String| SupervisorError::Http {
            method: method.to_string(),
            message,
        };
        tracing::debug!("xml-rpc {method} -> {}", self.url);

        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "text/xml")
            .send_string(&encode_call(method, params))
            .map_err(|e| http_err(e.to_string()))?;
        let body = response.into_string().map_err(|e| http_err(e.to_string()))?;

        match decode_response(&body)? {
            Response::Success(value) => Ok(value),
            Response::Fault { code, message } => Err(SupervisorError::Fault {
                method: method.to_string(),
                code,
                message,
            }),
        }
    }

    fn call_bool(&self, method: &str, params: &[Value]) -> Result<bool, SupervisorError> {
        let value = self.call(method, params)?;
        value
            .as_bool()
            .ok_or_else(|| unexpected(method, &value))
    }
}

fn unexpected(method: &str, value: &Value) -> SupervisorError {
    SupervisorError::UnexpectedResponse {
        method: method.to_string(),
        detail: format!("{value:?}"),
    }
}

fn string_list(method: &str, value: &Value) -> Result<Vec<String>, SupervisorError> {
    value
        .as_array()
        .ok_or_else(|| unexpected(method, value))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| unexpected(method, v))
        })
        .collect()
}

/// Interpret the `[[added, changed, removed]]` shape of `reloadConfig`.
pub fn config_diff_from(value: &Value) -> Result<ConfigDiff, SupervisorError> {
    const METHOD: &str = "supervisor.reloadConfig";
    let mut outer = value.as_array().ok_or_else(|| unexpected(METHOD, value))?;
    // supervisord wraps the triple in a single-element array.
    if let [inner @ Value::Array(_)] = outer {
        outer = inner.as_array().unwrap_or_default();
    }
    let [added, changed, removed] = outer else {
        return Err(unexpected(METHOD, value));
    };
    Ok(ConfigDiff {
        added: string_list(METHOD, added)?,
        changed: string_list(METHOD, changed)?,
        removed: string_list(METHOD, removed)?,
    })
}

/// Collapse a group stop/start result into a boolean: either a plain
/// boolean, or an array of per-process result structs that must all report
/// success.
pub fn group_succeeded(method: &str, value: &Value) -> Result<bool, SupervisorError> {
    if let Some(b) = value.as_bool() {
        return Ok(b);
    }
    let results = value.as_array().ok_or_else(|| unexpected(method, value))?;
    let mut ok = true;
    for result in results {
        let status = result
            .get("status")
            .and_then(Value::as_i64)
            .ok_or_else(|| unexpected(method, result))?;
        if status != STATUS_SUCCESS {
            let name = result.get("name").and_then(Value::as_str).unwrap_or("?");
            let description = result
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("");
            tracing::warn!("{method}: {name} failed: {description}");
            ok = false;
        }
    }
    Ok(ok)
}

impl SupervisorRpc for SupervisorClient {
    fn get_state(&self) -> Result<SupervisorState, SupervisorError> {
        const METHOD: &str = "supervisor.getState";
        let value = self.call(METHOD, &[])?;
        let code = value
            .get("statecode")
            .and_then(Value::as_i64)
            .ok_or_else(|| unexpected(METHOD, &value))?;
        let name = value
            .get("statename")
            .and_then(Value::as_str)
            .ok_or_else(|| unexpected(METHOD, &value))?
            .to_string();
        Ok(SupervisorState { code, name })
    }

    fn reload_config(&self) -> Result<ConfigDiff, SupervisorError> {
        config_diff_from(&self.call("supervisor.reloadConfig", &[])?)
    }

    fn add_process_group(&self, name: &str) -> Result<bool, SupervisorError> {
        self.call_bool("supervisor.addProcessGroup", &[Value::from(name)])
    }

    fn remove_process_group(&self, name: &str) -> Result<bool, SupervisorError> {
        self.call_bool("supervisor.removeProcessGroup", &[Value::from(name)])
    }

    fn stop_process_group(&self, name: &str) -> Result<bool, SupervisorError> {
        const METHOD: &str = "supervisor.stopProcessGroup";
        let value = self.call(METHOD, &[Value::from(name), Value::from(true)])?;
        group_succeeded(METHOD, &value)
    }

    fn start_process_group(&self, name: &str) -> Result<bool, SupervisorError> {
        const METHOD: &str = "supervisor.startProcessGroup";
        let value = self.call(METHOD, &[Value::from(name), Value::from(true)])?;
        group_succeeded(METHOD, &value)
    }

    fn stop_all_processes(&self) -> Result<bool, SupervisorError> {
        const METHOD: &str = "supervisor.stopAllProcesses";
        let value = self.call(METHOD, &[Value::from(true)])?;
        group_succeeded(METHOD, &value)
    }

    fn restart(&self) -> Result<bool, SupervisorError> {
        self.call_bool("supervisor.restart", &[])
    }
}
