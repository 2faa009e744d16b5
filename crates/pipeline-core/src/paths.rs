use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PIPELINE_DIR: &str = ".pipeline";
pub const CONFIG_FILE: &str = ".pipeline/config.yaml";
pub const DEFAULT_LEDGER_FILE: &str = ".pipeline/ledger.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn pipeline_dir(root: &Path) -> PathBuf {
    root.join(PIPELINE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a configured ledger path; relative paths are taken from `root`.
pub fn resolve_ledger_path(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_ledger_path_is_rooted() {
        let root = Path::new("/work/project");
        assert_eq!(
            resolve_ledger_path(root, Path::new(DEFAULT_LEDGER_FILE)),
            PathBuf::from("/work/project/.pipeline/ledger.redb")
        );
    }

    #[test]
    fn absolute_ledger_path_is_kept() {
        let root = Path::new("/work/project");
        assert_eq!(
            resolve_ledger_path(root, Path::new("/var/lib/pipeline/ledger.redb")),
            PathBuf::from("/var/lib/pipeline/ledger.redb")
        );
    }
}
