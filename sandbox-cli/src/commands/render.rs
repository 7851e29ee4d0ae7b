//! `sandbox render`: print the supervisor config a relaunch would write.

use anyhow::{Context, Result};
use clap::Args;

use sandbox_detector::read_procfile;
use sandbox_supervisor::{ConfigRenderer, SupervisorConfig};

/// Render the supervisor configuration for the current app tree.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Also write it to the configured supervisor config path.
    #[arg(long)]
    pub write: bool,
}

impl RenderArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let cfg = super::load_config(&home)?;

        let procfile = cfg.procfile_path();
        let descriptors = read_procfile(&procfile)
            .with_context(|| format!("failed to read {}", procfile.display()))?;
        let supervisor_cfg =
            SupervisorConfig::build(&cfg.supervisor, &descriptors, &cfg.environment, &cfg.app_dir)
                .context("invalid supervisor configuration")?;
        let renderer = ConfigRenderer::new(cfg.supervisor.template_dir.as_deref())
            .context("failed to load supervisor templates")?;

        let rendered = if self.write {
            let path = cfg.supervisor.config_path();
            let rendered = renderer
                .write(&supervisor_cfg, &path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("wrote {}", path.display());
            rendered
        } else {
            renderer
                .render(&supervisor_cfg)
                .context("failed to render supervisor config")?
        };
        print!("{rendered}");
        Ok(())
    }
}
