use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use pipeline_core::config::{Config, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective config
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    if json {
        return print_json(&config);
    }
    println!("Project:          {}", config.project.name);
    println!("Ledger:           {}", config.ledger_path(root).display());
    println!(
        "Run -> running:   {}",
        if config.workflow.run_advances_to_running {
            "enabled"
        } else {
            "disabled (run stays in deploying)"
        }
    );
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
