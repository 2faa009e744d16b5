pub mod config;
pub mod history;
pub mod init;
pub mod invoke;
pub mod list;
pub mod serve;
pub mod show;
pub mod transition;

use anyhow::Context;
use pipeline_core::config::{Config, WarnLevel};
use pipeline_core::ledger::RedbLedger;
use std::path::Path;

/// Load the project config and open its ledger.
pub fn open_ledger(root: &Path) -> anyhow::Result<(Config, RedbLedger)> {
    let config = Config::load(root).context("failed to load config")?;
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("config: {}", w.message),
            WarnLevel::Error => tracing::error!("config: {}", w.message),
        }
    }
    let path = config.ledger_path(root);
    let ledger = RedbLedger::open(&path)
        .with_context(|| format!("failed to open ledger {}", path.display()))?;
    Ok((config, ledger))
}
