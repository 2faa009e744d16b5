use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::entity::{Entity, ExtraFields};
use crate::error::{PipelineError, Result};

/// Discriminator for change items.
pub const CHANGE_ITEM_CLASS: &str = "changepipeline.change-item";

/// Namespace of the change item collection.
pub const CHANGE_ITEM_NAMESPACE: &str = "changepipeline.change-item-list";

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Assigned,
    Designing,
    Developing,
    Verifying,
    Packaging,
    Deploying,
    Running,
}

impl PipelineState {
    pub fn all() -> &'static [PipelineState] {
        &[
            PipelineState::Assigned,
            PipelineState::Designing,
            PipelineState::Developing,
            PipelineState::Verifying,
            PipelineState::Packaging,
            PipelineState::Deploying,
            PipelineState::Running,
        ]
    }

    /// Position in the pipeline, starting at 1 for `Assigned`.
    pub fn ordinal(self) -> u8 {
        self as u8 + 1
    }

    pub fn next(self) -> Option<PipelineState> {
        PipelineState::all().get(self.ordinal() as usize).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Assigned => "assigned",
            PipelineState::Designing => "designing",
            PipelineState::Developing => "developing",
            PipelineState::Verifying => "verifying",
            PipelineState::Packaging => "packaging",
            PipelineState::Deploying => "deploying",
            PipelineState::Running => "running",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelineState {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(PipelineState::Assigned),
            "designing" => Ok(PipelineState::Designing),
            "developing" => Ok(PipelineState::Developing),
            "verifying" => Ok(PipelineState::Verifying),
            "packaging" => Ok(PipelineState::Packaging),
            "deploying" => Ok(PipelineState::Deploying),
            "running" => Ok(PipelineState::Running),
            _ => Err(PipelineError::InvalidArgument(format!(
                "unknown pipeline state '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// TestResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestResult {
    Passed,
    Failed,
    Blocked,
    Skipped,
}

impl TestResult {
    pub fn as_str(self) -> &'static str {
        match self {
            TestResult::Passed => "Passed",
            TestResult::Failed => "Failed",
            TestResult::Blocked => "Blocked",
            TestResult::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TestResult {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "passed" => Ok(TestResult::Passed),
            "failed" => Ok(TestResult::Failed),
            "blocked" => Ok(TestResult::Blocked),
            "skipped" => Ok(TestResult::Skipped),
            _ => Err(PipelineError::InvalidArgument(format!(
                "unknown test result '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ChangeItem
// ---------------------------------------------------------------------------

/// One unit of work (bug, story, enhancement) moving through the pipeline.
///
/// `item_type` and `item_number` form the identity and never change. Every
/// field filled in by a later stage is optional until that stage runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeItem {
    pub item_type: String,
    pub item_number: String,
    pub name: String,
    pub sprint_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_result: Option<TestResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_address: Option<String>,
    pub current_state: PipelineState,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl ChangeItem {
    /// A freshly assigned item.
    pub fn new(
        item_type: impl Into<String>,
        item_number: impl Into<String>,
        name: impl Into<String>,
        sprint_name: impl Into<String>,
    ) -> Self {
        Self {
            item_type: item_type.into(),
            item_number: item_number.into(),
            name: name.into(),
            sprint_name: sprint_name.into(),
            designer_name: None,
            developer_name: None,
            commit_hash: None,
            test_result: None,
            artifact_name: None,
            artifact_version: None,
            server_address: None,
            current_state: PipelineState::Assigned,
            extra: ExtraFields::new(),
        }
    }

    /// Short human label, e.g. `Bug 7`.
    pub fn label(&self) -> String {
        item_label(&self.item_type, &self.item_number)
    }

    pub fn is_in(&self, state: PipelineState) -> bool {
        self.current_state == state
    }
}

pub fn item_label(item_type: &str, item_number: &str) -> String {
    format!("{item_type} {item_number}")
}

// ---------------------------------------------------------------------------
// Identity validation
// ---------------------------------------------------------------------------

const MAX_IDENTITY_LEN: usize = 128;

static IDENTITY_RE: OnceLock<Regex> = OnceLock::new();

fn identity_re() -> &'static Regex {
    IDENTITY_RE.get_or_init(|| Regex::new(r"^[^\p{Cc}]+$").unwrap())
}

/// Reject identity components that are empty, oversized or carry control
/// characters. Runs before any store access.
pub fn validate_identity(item_type: &str, item_number: &str) -> Result<()> {
    for (field, value) in [("item_type", item_type), ("item_number", item_number)] {
        if value.trim().is_empty() {
            return Err(PipelineError::InvalidArgument(format!("{field} must not be empty")));
        }
        if value.len() > MAX_IDENTITY_LEN {
            return Err(PipelineError::InvalidArgument(format!(
                "{field} is longer than {MAX_IDENTITY_LEN} bytes"
            )));
        }
        if !identity_re().is_match(value) {
            return Err(PipelineError::InvalidArgument(format!(
                "{field} '{}' contains control characters",
                value.escape_debug()
            )));
        }
    }
    Ok(())
}

impl Entity for ChangeItem {
    const CLASS: &'static str = CHANGE_ITEM_CLASS;

    fn key_parts(&self) -> Vec<String> {
        vec![self.item_type.clone(), self.item_number.clone()]
    }
}

/// Decoder injected into the change item collection.
pub fn decode_change_item(bytes: &[u8]) -> Result<ChangeItem> {
    crate::entity::deserialize::<ChangeItem>(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
