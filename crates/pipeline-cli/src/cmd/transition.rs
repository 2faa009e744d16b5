use super::open_ledger;
use super::show::print_item;
use clap::Subcommand;
use pipeline_core::workflow::Pipeline;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand definition
// ---------------------------------------------------------------------------

#[derive(Subcommand, Debug)]
pub enum TransitionCommand {
    /// Create a change item (state: assigned)
    Assign {
        item_type: String,
        item_number: String,
        name: String,
        sprint_name: String,
    },
    /// Hand an assigned item to a designer (state: designing)
    Design {
        item_type: String,
        item_number: String,
        sprint_name: String,
        designer_name: String,
    },
    /// Hand a designed item to a developer (state: developing)
    Develop {
        item_type: String,
        item_number: String,
        sprint_name: String,
        designer_name: String,
        developer_name: String,
    },
    /// Record the commit under verification (state: verifying)
    Verify {
        item_type: String,
        item_number: String,
        developer_name: String,
        commit_hash: String,
    },
    /// Package a verified commit; the test result must be Passed (state: packaging)
    Package {
        item_type: String,
        item_number: String,
        commit_hash: String,
        test_result: String,
    },
    /// Record the deployed artifact (state: deploying)
    Deploy {
        item_type: String,
        item_number: String,
        commit_hash: String,
        artifact_name: String,
        artifact_version: String,
    },
    /// Record the server a deployed artifact runs on
    Run {
        item_type: String,
        item_number: String,
        artifact_name: String,
        artifact_version: String,
        server_address: String,
    },
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn run(root: &Path, command: TransitionCommand, json: bool) -> anyhow::Result<()> {
    let (config, ledger) = open_ledger(root)?;
    let pipeline = Pipeline::new(&ledger, config.workflow);

    let item = match command {
        TransitionCommand::Assign {
            item_type,
            item_number,
            name,
            sprint_name,
        } => pipeline.assign(&item_type, &item_number, &name, &sprint_name)?,
        TransitionCommand::Design {
            item_type,
            item_number,
            sprint_name,
            designer_name,
        } => pipeline.design(&item_type, &item_number, &sprint_name, &designer_name)?,
        TransitionCommand::Develop {
            item_type,
            item_number,
            sprint_name,
            designer_name,
            developer_name,
        } => pipeline.develop(
            &item_type,
            &item_number,
            &sprint_name,
            &designer_name,
            &developer_name,
        )?,
        TransitionCommand::Verify {
            item_type,
            item_number,
            developer_name,
            commit_hash,
        } => pipeline.verify(&item_type, &item_number, &developer_name, &commit_hash)?,
        TransitionCommand::Package {
            item_type,
            item_number,
            commit_hash,
            test_result,
        } => pipeline.package(&item_type, &item_number, &commit_hash, &test_result)?,
        TransitionCommand::Deploy {
            item_type,
            item_number,
            commit_hash,
            artifact_name,
            artifact_version,
        } => pipeline.deploy(
            &item_type,
            &item_number,
            &commit_hash,
            &artifact_name,
            &artifact_version,
        )?,
        TransitionCommand::Run {
            item_type,
            item_number,
            artifact_name,
            artifact_version,
            server_address,
        } => pipeline.run(
            &item_type,
            &item_number,
            &artifact_name,
            &artifact_version,
            &server_address,
        )?,
    };

    print_item(&item, json)
}
