use crate::error::{PipelineError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// redb file; relative paths are resolved against the project root.
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from(paths::DEFAULT_LEDGER_FILE)
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// When set, `run` moves a deployed item to `running`. Off by default:
    /// `run` records the server address and leaves the item in `deploying`.
    #[serde(default)]
    pub run_advances_to_running: bool,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            ledger: LedgerConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PipelineError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::replace_file(&path, data.as_bytes())
    }

    /// Write this config for a project at `root` unless one exists already.
    /// Returns whether it was written.
    pub fn create(&self, root: &Path) -> Result<bool> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::create_file(&path, data.as_bytes())
    }

    /// Absolute location of the ledger file for a project at `root`.
    pub fn ledger_path(&self, root: &Path) -> PathBuf {
        paths::resolve_ledger_path(root, &self.ledger.path)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.project.name.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "project.name is empty".to_string(),
            });
        }

        if self.version != 1 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("unsupported config version {}", self.version),
            });
        }

        if self.ledger.path.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "ledger.path is empty".to_string(),
            });
        } else if self.ledger.path.is_absolute() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "ledger.path '{}' is outside the project",
                    self.ledger.path.display()
                ),
            });
        }

        if self.workflow.run_advances_to_running {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "workflow.run_advances_to_running is enabled: 'run' moves items to running"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
