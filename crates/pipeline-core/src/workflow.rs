//! Workflow engine: guarded, forward-only transitions over change items.
//!
//! Every transition follows the same order: validate the identity, load the
//! record, check the required predecessor state, check each correlating
//! argument against the stored value, and only then mutate and write. The
//! load and the write happen in one store transaction, and a rejected call
//! writes nothing.

use crate::collection::EntityCollection;
use crate::config::WorkflowConfig;
use crate::error::{PipelineError, Result};
use crate::item::{
    decode_change_item, item_label, validate_identity, ChangeItem, PipelineState, TestResult,
    CHANGE_ITEM_NAMESPACE,
};
use crate::ledger::LedgerStore;

pub struct Pipeline<'a> {
    items: EntityCollection<'a, ChangeItem>,
    config: WorkflowConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a dyn LedgerStore, config: WorkflowConfig) -> Self {
        Self {
            items: EntityCollection::new(store, CHANGE_ITEM_NAMESPACE, decode_change_item),
            config,
        }
    }

    pub fn items(&self) -> &EntityCollection<'a, ChangeItem> {
        &self.items
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn get(&self, item_type: &str, item_number: &str) -> Result<ChangeItem> {
        validate_identity(item_type, item_number)?;
        self.items.get(&self.items.key_for([item_type, item_number]))
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Create a new item in `assigned`.
    pub fn assign(
        &self,
        item_type: &str,
        item_number: &str,
        name: &str,
        sprint_name: &str,
    ) -> Result<ChangeItem> {
        validate_identity(item_type, item_number)?;
        let item = ChangeItem::new(item_type, item_number, name, sprint_name);
        if let Err(e) = self.items.add(&item) {
            tracing::warn!(item = %item.label(), "assign rejected: {e}");
            return Err(e);
        }
        tracing::info!("assign {} [{}] to {}", item.label(), name, sprint_name);
        Ok(item)
    }

    pub fn design(
        &self,
        item_type: &str,
        item_number: &str,
        sprint_name: &str,
        designer_name: &str,
    ) -> Result<ChangeItem> {
        const ACTION: &str = "begin design";
        self.transition(ACTION, item_type, item_number, PipelineState::Assigned, |item| {
            guard(ACTION, item, "sprint_name", Some(item.sprint_name.as_str()), sprint_name)?;
            item.current_state = PipelineState::Designing;
            item.designer_name = Some(designer_name.to_string());
            Ok(())
        })
    }

    pub fn develop(
        &self,
        item_type: &str,
        item_number: &str,
        sprint_name: &str,
        designer_name: &str,
        developer_name: &str,
    ) -> Result<ChangeItem> {
        const ACTION: &str = "begin development";
        self.transition(ACTION, item_type, item_number, PipelineState::Designing, |item| {
            guard(ACTION, item, "sprint_name", Some(item.sprint_name.as_str()), sprint_name)?;
            guard(ACTION, item, "designer_name", item.designer_name.as_deref(), designer_name)?;
            item.current_state = PipelineState::Developing;
            item.developer_name = Some(developer_name.to_string());
            Ok(())
        })
    }

    pub fn verify(
        &self,
        item_type: &str,
        item_number: &str,
        developer_name: &str,
        commit_hash: &str,
    ) -> Result<ChangeItem> {
        const ACTION: &str = "begin verification";
        self.transition(ACTION, item_type, item_number, PipelineState::Developing, |item| {
            guard(ACTION, item, "developer_name", item.developer_name.as_deref(), developer_name)?;
            item.current_state = PipelineState::Verifying;
            item.commit_hash = Some(commit_hash.to_string());
            Ok(())
        })
    }

    /// Only a `Passed` verification may be packaged. Any other result,
    /// including one that does not parse, is rejected as a mismatch.
    pub fn package(
        &self,
        item_type: &str,
        item_number: &str,
        commit_hash: &str,
        test_result: &str,
    ) -> Result<ChangeItem> {
        const ACTION: &str = "begin packaging";
        self.transition(ACTION, item_type, item_number, PipelineState::Verifying, |item| {
            guard(ACTION, item, "commit_hash", item.commit_hash.as_deref(), commit_hash)?;
            let passed = TestResult::Passed;
            if test_result.parse::<TestResult>().ok() != Some(passed) {
                return Err(mismatch(
                    ACTION,
                    item,
                    "required test_result",
                    passed.as_str(),
                    test_result,
                ));
            }
            item.current_state = PipelineState::Packaging;
            item.test_result = Some(passed);
            Ok(())
        })
    }

    pub fn deploy(
        &self,
        item_type: &str,
        item_number: &str,
        commit_hash: &str,
        artifact_name: &str,
        artifact_version: &str,
    ) -> Result<ChangeItem> {
        const ACTION: &str = "begin deploying";
        self.transition(ACTION, item_type, item_number, PipelineState::Packaging, |item| {
            guard(ACTION, item, "commit_hash", item.commit_hash.as_deref(), commit_hash)?;
            item.current_state = PipelineState::Deploying;
            item.artifact_name = Some(artifact_name.to_string());
            item.artifact_version = Some(artifact_version.to_string());
            Ok(())
        })
    }

    /// Record where a deployed artifact is running.
    ///
    /// Known issue: unless `run_advances_to_running` is set, the item stays
    /// in `deploying`, so `running` is never reached and the call may be
    /// repeated. Kept until product owners confirm the terminal transition.
    pub fn run(
        &self,
        item_type: &str,
        item_number: &str,
        artifact_name: &str,
        artifact_version: &str,
        server_address: &str,
    ) -> Result<ChangeItem> {
        const ACTION: &str = "run";
        let advance = self.config.run_advances_to_running;
        self.transition(ACTION, item_type, item_number, PipelineState::Deploying, |item| {
            guard(ACTION, item, "artifact_name", item.artifact_name.as_deref(), artifact_name)?;
            guard(
                ACTION,
                item,
                "artifact_version",
                item.artifact_version.as_deref(),
                artifact_version,
            )?;
            if advance {
                item.current_state = PipelineState::Running;
            }
            item.server_address = Some(server_address.to_string());
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Guard helpers
    // -----------------------------------------------------------------------

    /// Load the item, require `expected`, let `apply` check and mutate it,
    /// then write it back. Load, checks and write share one store
    /// transaction, so two concurrent calls cannot both pass the state guard.
    fn transition<F>(
        &self,
        action: &str,
        item_type: &str,
        item_number: &str,
        expected: PipelineState,
        apply: F,
    ) -> Result<ChangeItem>
    where
        F: FnOnce(&mut ChangeItem) -> Result<()>,
    {
        validate_identity(item_type, item_number)?;
        let key = self.items.key_for([item_type, item_number]);
        let outcome = self.items.modify(&key, |mut item| {
            if item.current_state != expected {
                return Err(PipelineError::InvalidState {
                    action: action.to_string(),
                    item: item_label(item_type, item_number),
                    expected: expected.to_string(),
                    actual: item.current_state.to_string(),
                });
            }
            apply(&mut item)?;
            Ok(item)
        });
        match outcome {
            Ok((item, commit)) => {
                tracing::info!(
                    tx_id = %commit.tx_id,
                    "{action}: {} is now {}",
                    item.label(),
                    item.current_state
                );
                Ok(item)
            }
            Err(e) => {
                tracing::warn!("{e}");
                Err(e)
            }
        }
    }
}

fn guard(
    action: &str,
    item: &ChangeItem,
    field: &str,
    stored: Option<&str>,
    supplied: &str,
) -> Result<()> {
    if stored == Some(supplied) {
        return Ok(());
    }
    Err(mismatch(
        action,
        item,
        field,
        stored.unwrap_or("<unset>"),
        supplied,
    ))
}

fn mismatch(
    action: &str,
    item: &ChangeItem,
    field: &str,
    actual: &str,
    supplied: &str,
) -> PipelineError {
    PipelineError::CorrelationMismatch {
        action: action.to_string(),
        item: item.label(),
        field: field.to_string(),
        actual: actual.to_string(),
        supplied: supplied.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
