//! Sandbox configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.sandbox/
//!   config.yaml     (optional; every field has a default, mode 0600)
//!   app/            (deployed application tree, default `app_dir`)
//!   results/        (reload status + logs, default `results_dir`)
//!   supervisor/     (rendered supervisord config, sockets, process logs)
//! ```
//!
//! Relative paths in `config.yaml` are resolved against `~/.sandbox/`.
//!
//! As in the rest of the workspace, every function that touches the home
//! directory has an `_at(home: &Path, …)` form; the no-arg wrappers derive
//! home from `dirs::home_dir()`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{config_io, ConfigError};

pub const CONFIG_FILE: &str = "config.yaml";

/// Name/value pair exported to supervised processes. Order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Where and how the process supervisor runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Directory holding the rendered config, control socket, pid and logs.
    pub root: PathBuf,
    /// XML-RPC port bound on 127.0.0.1.
    pub port: u16,
    /// Supervisor daemon binary, looked up on `PATH` when relative.
    pub binary: PathBuf,
    /// Readiness polls after launching the daemon.
    pub ready_attempts: u32,
    /// Initial delay between readiness polls; doubles each attempt.
    pub ready_backoff_ms: u64,
    /// Per-call XML-RPC transport timeout.
    pub rpc_timeout_ms: u64,
    /// Optional directory of `.tera` templates overriding the embedded ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("supervisor"),
            port: 9001,
            binary: PathBuf::from("supervisord"),
            ready_attempts: 8,
            ready_backoff_ms: 100,
            rpc_timeout_ms: 10_000,
            template_dir: None,
        }
    }
}

impl SupervisorSettings {
    pub fn config_path(&self) -> PathBuf {
        self.root.join("supervisord.conf")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.root.join("supervisor.sock")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    pub fn rpc_url(&self) -> String {
        format!("http://127.0.0.1:{}/RPC2", self.port)
    }
}

/// Top-level sandbox configuration, passed explicitly to every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Deployed application tree (tracked by the change tracker).
    pub app_dir: PathBuf,
    /// Result store root.
    pub results_dir: PathBuf,
    /// External build command argv; empty means rebuilds are no-ops.
    pub build_command: Vec<String>,
    /// Dependency manifests whose change triggers a rebuild.
    pub manifests: Vec<String>,
    /// Path prefixes never reported as changes.
    pub ignore_prefixes: Vec<String>,
    /// Process manifest, relative to `app_dir`.
    pub procfile: PathBuf,
    /// Environment exported to every supervised process.
    pub environment: Vec<EnvVar>,
    pub supervisor: SupervisorSettings,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from("app"),
            results_dir: PathBuf::from("results"),
            build_command: vec![],
            manifests: default_manifests(),
            ignore_prefixes: vec![".sandbox-logs/".to_string()],
            procfile: PathBuf::from("Procfile"),
            environment: vec![],
            supervisor: SupervisorSettings::default(),
        }
    }
}

impl SandboxConfig {
    /// Defaults with every relative path resolved against `<home>/.sandbox/`.
    pub fn defaults_at(home: &Path) -> Self {
        let mut config = Self::default();
        config.resolve(&sandbox_root(home));
        config
    }

    /// Absolute path of the process manifest.
    pub fn procfile_path(&self) -> PathBuf {
        self.app_dir.join(&self.procfile)
    }

    /// Join every relative directory onto `root`. Absolute paths are kept.
    fn resolve(&mut self, root: &Path) {
        for path in [
            &mut self.app_dir,
            &mut self.results_dir,
            &mut self.supervisor.root,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        if let Some(dir) = self.supervisor.template_dir.as_mut() {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
    }
}

/// Manifests compared by default: npm, pip, apt, bundler and go module lists.
pub fn default_manifests() -> Vec<String> {
    ["package.json", "requirements.txt", "Aptfile", "Gemfile.lock", "go.mod"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.sandbox/`
pub fn sandbox_root(home: &Path) -> PathBuf {
    home.join(".sandbox")
}

/// `<home>/.sandbox/config.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    sandbox_root(home).join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load `<home>/.sandbox/config.yaml`, falling back to defaults when absent.
pub fn load_at(home: &Path) -> Result<SandboxConfig, ConfigError> {
    let path = config_path_at(home);
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(&path).map_err(|e| config_io(&path, e))?;
        if contents.trim().is_empty() {
            SandboxConfig::default()
        } else {
            serde_yaml::from_str(&contents)
                .map_err(|source| ConfigError::Parse { path: path.clone(), source })?
        }
    } else {
        SandboxConfig::default()
    };
    config.resolve(&sandbox_root(home));
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<SandboxConfig, ConfigError> {
    load_at(&home()?)
}

/// Atomically save `config` to `<home>/.sandbox/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &SandboxConfig) -> Result<PathBuf, ConfigError> {
    let root = sandbox_root(home);
    std::fs::create_dir_all(&root).map_err(|e| config_io(&root, e))?;

    let path = config_path_at(home);
    let tmp = path.with_file_name(format!("{CONFIG_FILE}.tmp"));
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| config_io(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| config_io(&path, e))?;
    Ok(path)
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| config_io(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_resolved_defaults() {
        let home = TempDir::new().expect("home");
        let config = load_at(home.path()).expect("load");
        assert_eq!(config.app_dir, home.path().join(".sandbox").join("app"));
        assert_eq!(
            config.supervisor.root,
            home.path().join(".sandbox").join("supervisor")
        );
        assert_eq!(config.supervisor.port, 9001);
        assert!(config.manifests.contains(&"requirements.txt".to_string()));
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_fields() {
        let home = TempDir::new().expect("home");
        let root = sandbox_root(home.path());
        std::fs::create_dir_all(&root).expect("mkdir");
        std::fs::write(
            root.join(CONFIG_FILE),
            "app_dir: /srv/app\nsupervisor:\n  port: 9100\nenvironment:\n  - name: FOO\n    value: bar\n",
        )
        .expect("write");

        let config = load_at(home.path()).expect("load");
        assert_eq!(config.app_dir, PathBuf::from("/srv/app"));
        assert_eq!(config.results_dir, root.join("results"));
        assert_eq!(config.supervisor.port, 9100);
        assert_eq!(config.supervisor.binary, PathBuf::from("supervisord"));
        assert_eq!(config.environment, vec![EnvVar::new("FOO", "bar")]);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let home = TempDir::new().expect("home");
        let mut config = SandboxConfig::defaults_at(home.path());
        config.build_command = vec!["make".into(), "build".into()];
        save_at(home.path(), &config).expect("save");

        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded, config);
        let tmp = config_path_at(home.path()).with_file_name("config.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let home = TempDir::new().expect("home");
        let root = sandbox_root(home.path());
        std::fs::create_dir_all(&root).expect("mkdir");
        std::fs::write(root.join(CONFIG_FILE), "supervisor: [unclosed").expect("write");

        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn supervisor_paths_derive_from_root() {
        let settings = SupervisorSettings {
            root: PathBuf::from("/run/sv"),
            ..SupervisorSettings::default()
        };
        assert_eq!(settings.config_path(), PathBuf::from("/run/sv/supervisord.conf"));
        assert_eq!(settings.rpc_url(), "http://127.0.0.1:9001/RPC2");
    }
}
