use super::open_ledger;
use crate::output::{print_json_stream, print_table};
use pipeline_core::audit::{AuditQuery, QueryRecord, RecordValue, Selector};
use std::path::Path;

pub fn run(root: &Path, selector: Option<&str>, json: bool) -> anyhow::Result<()> {
    let selector = match selector {
        Some(expr) => Selector::parse(expr)?,
        None => Selector::default(),
    };
    let (_config, ledger) = open_ledger(root)?;
    let audit = AuditQuery::new(&ledger);
    let records = audit.list_all(&selector)?;

    if json {
        print_json_stream(records)?;
        return Ok(());
    }

    let mut rows = Vec::new();
    for record in records {
        rows.push(row(&record?));
    }
    if rows.is_empty() {
        println!("No items.");
        return Ok(());
    }
    print_table(&["KEY", "STATE", "NAME", "SPRINT"], rows);
    Ok(())
}

fn row(record: &QueryRecord) -> Vec<String> {
    let key = record.key.to_string();
    match &record.record {
        RecordValue::Decoded(value) => {
            let field = |name: &str| value[name].as_str().unwrap_or("-").to_string();
            vec![key, field("current_state"), field("name"), field("sprint_name")]
        }
        RecordValue::Raw(_) => vec![key, "<undecodable>".to_string(), String::new(), String::new()],
    }
}
