use pipeline_core::config::Config;
use pipeline_core::ledger::RedbLedger;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub ledger: RedbLedger,
}

impl AppState {
    pub fn new(root: PathBuf, config: Config, ledger: RedbLedger) -> Self {
        Self {
            root,
            config: Arc::new(config),
            ledger,
        }
    }

    /// Load the project config at `root` and open its ledger.
    pub fn open(root: &Path) -> pipeline_core::Result<Self> {
        let config = Config::load(root)?;
        let ledger = RedbLedger::open(&config.ledger_path(root))?;
        Ok(Self::new(root.to_path_buf(), config, ledger))
    }
}
