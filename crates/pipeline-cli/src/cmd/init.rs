use crate::output::print_json;
use anyhow::Context;
use pipeline_core::{config::Config, ledger::RedbLedger, paths};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    let config_path = paths::config_path(root);
    let config_created = Config::new(&project_name)
        .create(root)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    let config = Config::load(root).context("failed to load config")?;

    let ledger_path = config.ledger_path(root);
    let ledger_created = !ledger_path.exists();
    RedbLedger::open(&ledger_path)
        .with_context(|| format!("failed to open ledger {}", ledger_path.display()))?;

    if json {
        print_json(&serde_json::json!({
            "root": root,
            "config": config_path,
            "config_created": config_created,
            "ledger": ledger_path,
            "ledger_created": ledger_created,
        }))?;
        return Ok(());
    }

    println!("Initializing pipeline in: {}", root.display());
    println!("  {}  {}", status(config_created), paths::CONFIG_FILE);
    println!("  {}  {}", status(ledger_created), ledger_path.display());
    Ok(())
}

fn status(created: bool) -> &'static str {
    if created {
        "created:"
    } else {
        "exists: "
    }
}
