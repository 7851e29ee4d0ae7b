//! Supervisor configuration rendering.
//!
//! The embedded template is baked into the binary with `include_str!`. A
//! user template directory may override it with a file of the same name
//! (`supervisord.conf.tera`); names are normalised to lowercase relative
//! paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tera::{Context, Tera};

use sandbox_core::types::invalid_process_types;
use sandbox_core::{EnvVar, ProcessDescriptor, SupervisorSettings};

use crate::env::escape_environment;
use crate::error::{render_io, RenderError};

pub const CONFIG_TEMPLATE: &str = "supervisord.conf.tera";

const TPLS: &[(&str, &str)] = &[(
    CONFIG_TEMPLATE,
    include_str!("templates/supervisord.conf.tera"),
)];

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| render_io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| render_io(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| render_io(&path, e))?;
        if meta.is_dir() {
            collect_template_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    collect_template_files(dir, &mut files)?;
    let mut templates = Vec::new();
    for path in files {
        if path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| render_io(&path, e))?;
        tracing::debug!("template override {name} from {}", path.display());
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert(
            normalize_template_name(Path::new(name)),
            (*content).to_string(),
        );
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

/// One `[program:<name>]` stanza.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramEntry {
    pub name: String,
    pub command: String,
    pub log_file: PathBuf,
}

/// Everything the supervisor configuration is rendered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorConfig {
    pub root: PathBuf,
    pub port: u16,
    pub socket_path: PathBuf,
    pub log_dir: PathBuf,
    /// Working directory of every program.
    pub directory: PathBuf,
    /// Pre-escaped `environment=` value.
    pub environment: Option<String>,
    pub programs: Vec<ProgramEntry>,
}

impl SupervisorConfig {
    /// Validate `descriptors` and `environment` and lay out one program per
    /// descriptor, in order, logging to `<log_dir>/<type>.log`.
    pub fn build(
        settings: &SupervisorSettings,
        descriptors: &[ProcessDescriptor],
        environment: &[EnvVar],
        directory: &Path,
    ) -> Result<Self, RenderError> {
        let invalid = invalid_process_types(descriptors);
        if !invalid.is_empty() {
            return Err(RenderError::InvalidProcessTypes { types: invalid });
        }
        let environment = escape_environment(environment)?;

        let log_dir = settings.log_dir();
        let programs = descriptors
            .iter()
            .map(|d| ProgramEntry {
                name: d.process_type.clone(),
                command: d.command.clone(),
                log_file: log_dir.join(format!("{}.log", d.process_type)),
            })
            .collect();

        Ok(Self {
            root: settings.root.clone(),
            port: settings.port,
            socket_path: settings.socket_path(),
            log_dir,
            directory: directory.to_path_buf(),
            environment,
            programs,
        })
    }

    /// Names of the process groups this config declares.
    pub fn group_names(&self) -> Vec<&str> {
        self.programs.iter().map(|p| p.name.as_str()).collect()
    }

    fn to_tera_context(&self) -> Result<Context, RenderError> {
        Ok(Context::from_serialize(self)?)
    }
}

/// Tera-backed renderer. Create once and reuse.
pub struct ConfigRenderer {
    tera: Tera,
}

impl ConfigRenderer {
    /// Embedded template plus any overrides in `user_template_dir`.
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(ConfigRenderer {
            tera: build_tera(user_template_dir)?,
        })
    }

    pub fn render(&self, config: &SupervisorConfig) -> Result<String, RenderError> {
        let ctx = config.to_tera_context()?;
        Ok(self.tera.render(CONFIG_TEMPLATE, &ctx)?)
    }

    /// Render and write atomically to `path`, creating the log directory.
    pub fn write(&self, config: &SupervisorConfig, path: &Path) -> Result<String, RenderError> {
        let rendered = self.render(config)?;
        std::fs::create_dir_all(&config.log_dir).map_err(|e| render_io(&config.log_dir, e))?;
        write_config(path, &rendered)?;
        Ok(rendered)
    }
}

/// Write `content` to `path` via a sibling `.tmp` file and rename.
pub fn write_config(path: &Path, content: &str) -> Result<(), RenderError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| render_io(parent, e))?;
    }
    let tmp = path.with_extension("conf.tmp");
    std::fs::write(&tmp, content).map_err(|e| render_io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| render_io(path, e))?;
    tracing::debug!("wrote supervisor config {}", path.display());
    Ok(())
}
