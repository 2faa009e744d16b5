use super::open_ledger;
use crate::output::{print_json_stream, print_table};
use pipeline_core::audit::{AuditQuery, RecordValue};
use std::path::Path;

pub fn run(root: &Path, item_type: &str, item_number: &str, json: bool) -> anyhow::Result<()> {
    let (_config, ledger) = open_ledger(root)?;
    let audit = AuditQuery::new(&ledger);
    let history = audit.history_of(item_type, item_number)?;

    if json {
        print_json_stream(history)?;
        return Ok(());
    }

    let mut rows = Vec::new();
    for entry in history {
        let entry = entry?;
        let state = match &entry.value {
            RecordValue::Decoded(v) => v["current_state"].as_str().unwrap_or("-").to_string(),
            RecordValue::Raw(_) => "<undecodable>".to_string(),
        };
        rows.push(vec![
            entry.timestamp.to_rfc3339(),
            entry.tx_id,
            state,
            if entry.is_delete { "yes" } else { "no" }.to_string(),
        ]);
    }
    if rows.is_empty() {
        println!("No history for {item_type} {item_number}.");
        return Ok(());
    }
    print_table(&["COMMITTED", "TX ID", "STATE", "DELETED"], rows);
    Ok(())
}
