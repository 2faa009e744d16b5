//! Named-procedure entry point.
//!
//! Submission boundaries (the CLI `invoke` command, the HTTP server) hand a
//! function name and its ordered string arguments to [`invoke`], which runs
//! the matching transition or query and returns the bytes to send back:
//! the serialized record for transitions and `get`, a JSON array for the
//! two queries.

use crate::audit::{write_json_array, AuditQuery, Selector};
use crate::config::WorkflowConfig;
use crate::entity;
use crate::error::{PipelineError, Result};
use crate::item::ChangeItem;
use crate::ledger::LedgerStore;
use crate::workflow::Pipeline;

/// Every callable function with its argument names, in call order.
pub const FUNCTIONS: &[(&str, &[&str])] = &[
    ("assign", &["item_type", "item_number", "name", "sprint_name"]),
    ("design", &["item_type", "item_number", "sprint_name", "designer_name"]),
    (
        "develop",
        &["item_type", "item_number", "sprint_name", "designer_name", "developer_name"],
    ),
    ("verify", &["item_type", "item_number", "developer_name", "commit_hash"]),
    ("package", &["item_type", "item_number", "commit_hash", "test_result"]),
    (
        "deploy",
        &["item_type", "item_number", "commit_hash", "artifact_name", "artifact_version"],
    ),
    (
        "run",
        &["item_type", "item_number", "artifact_name", "artifact_version", "server_address"],
    ),
    ("get", &["item_type", "item_number"]),
    ("list_all", &["[selector]"]),
    ("history_of", &["item_type", "item_number"]),
];

/// Map legacy names onto their canonical function.
pub fn canonical_name(function: &str) -> &str {
    match function {
        "queryAll" => "list_all",
        "historyFor" => "history_of",
        other => other,
    }
}

pub fn invoke(
    store: &dyn LedgerStore,
    config: &WorkflowConfig,
    function: &str,
    args: &[String],
) -> Result<Vec<u8>> {
    let name = canonical_name(function);
    tracing::debug!(function = name, args = args.len(), "invoke");
    let pipeline = Pipeline::new(store, config.clone());

    let item = match name {
        "assign" => {
            let [t, n, title, sprint] = arity::<4>(function, args)?;
            pipeline.assign(t, n, title, sprint)?
        }
        "design" => {
            let [t, n, sprint, designer] = arity::<4>(function, args)?;
            pipeline.design(t, n, sprint, designer)?
        }
        "develop" => {
            let [t, n, sprint, designer, developer] = arity::<5>(function, args)?;
            pipeline.develop(t, n, sprint, designer, developer)?
        }
        "verify" => {
            let [t, n, developer, commit] = arity::<4>(function, args)?;
            pipeline.verify(t, n, developer, commit)?
        }
        "package" => {
            let [t, n, commit, result] = arity::<4>(function, args)?;
            pipeline.package(t, n, commit, result)?
        }
        "deploy" => {
            let [t, n, commit, artifact, version] = arity::<5>(function, args)?;
            pipeline.deploy(t, n, commit, artifact, version)?
        }
        "run" => {
            let [t, n, artifact, version, server] = arity::<5>(function, args)?;
            pipeline.run(t, n, artifact, version, server)?
        }
        "get" => {
            let [t, n] = arity::<2>(function, args)?;
            pipeline.get(t, n)?
        }
        "list_all" => {
            let selector = match args {
                [] => Selector::default(),
                [expr] => Selector::parse(expr)?,
                _ => return Err(wrong_arity(function, "0 or 1", args.len())),
            };
            let audit = AuditQuery::new(store);
            let mut out = Vec::new();
            write_json_array(&mut out, audit.list_all(&selector)?)?;
            return Ok(out);
        }
        "history_of" => {
            let [t, n] = arity::<2>(function, args)?;
            let audit = AuditQuery::new(store);
            let mut out = Vec::new();
            write_json_array(&mut out, audit.history_of(t, n)?)?;
            return Ok(out);
        }
        _ => return Err(PipelineError::UnknownFunction(function.to_string())),
    };
    to_bytes(&pipeline, &item)
}

fn to_bytes(pipeline: &Pipeline<'_>, item: &ChangeItem) -> Result<Vec<u8>> {
    entity::serialize(item, &pipeline.items().key_of(item))
}

fn arity<'a, const N: usize>(function: &str, args: &'a [String]) -> Result<[&'a str; N]> {
    if args.len() != N {
        return Err(wrong_arity(function, &N.to_string(), args.len()));
    }
    Ok(std::array::from_fn(|i| args[i].as_str()))
}

fn wrong_arity(function: &str, expected: &str, actual: usize) -> PipelineError {
    PipelineError::InvalidArgument(format!(
        "{function} expects {expected} arguments, got {actual}"
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
