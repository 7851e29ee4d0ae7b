//! `sandbox changes [--content] [--json]`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sandbox_changeset::{as_tree, Tracker};
use sandbox_core::{DirTree, FileAction};

/// Show files changed in the app directory since the last deploy.
#[derive(Args, Debug)]
pub struct ChangesArgs {
    /// Attach current file contents (JSON output only).
    #[arg(long)]
    pub content: bool,

    /// Output the compressed directory tree as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ChangesArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let cfg = super::load_config(&home)?;
        let tracker = Tracker::new(&cfg.app_dir, cfg.ignore_prefixes.clone());

        if !tracker.is_prepared() {
            println!("no baseline in {} (nothing deployed yet)", cfg.app_dir.display());
            return Ok(());
        }

        let changes = tracker
            .pending(self.content)
            .with_context(|| format!("failed to diff {}", cfg.app_dir.display()))?;
        let tree = as_tree(&changes);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&tree).context("failed to render changes JSON")?
            );
            return Ok(());
        }

        if changes.is_empty() {
            println!("{}", "✓ No changes since last deploy".green());
            return Ok(());
        }
        println!("{} change(s) in {}", changes.len(), cfg.app_dir.display());
        print_tree(&tree, 0);
        Ok(())
    }
}

fn print_tree(tree: &DirTree, depth: usize) {
    let indent = "  ".repeat(depth);
    for dir in &tree.dirs {
        println!("{indent}{}/", dir.name.bold());
        print_tree(dir, depth + 1);
    }
    for file in &tree.files {
        let marker = match file.action {
            FileAction::Added => "+".green(),
            FileAction::Modified => "~".yellow(),
            FileAction::Deleted => "-".red(),
        };
        println!("{indent}{marker} {}", file.path);
    }
}
