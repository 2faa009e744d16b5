use super::open_ledger;
use crate::output::{print_json, print_table};
use pipeline_core::item::ChangeItem;
use pipeline_core::workflow::Pipeline;
use std::path::Path;

pub fn run(root: &Path, item_type: &str, item_number: &str, json: bool) -> anyhow::Result<()> {
    let (config, ledger) = open_ledger(root)?;
    let pipeline = Pipeline::new(&ledger, config.workflow);
    let item = pipeline.get(item_type, item_number)?;
    print_item(&item, json)
}

pub fn print_item(item: &ChangeItem, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(item);
    }

    let optional = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    let mut rows = vec![
        vec!["item".to_string(), item.label()],
        vec!["name".to_string(), item.name.clone()],
        vec![
            "state".to_string(),
            format!("{} ({}/7)", item.current_state, item.current_state.ordinal()),
        ],
        vec!["sprint".to_string(), item.sprint_name.clone()],
        vec!["designer".to_string(), optional(&item.designer_name)],
        vec!["developer".to_string(), optional(&item.developer_name)],
        vec!["commit".to_string(), optional(&item.commit_hash)],
        vec![
            "test result".to_string(),
            item.test_result
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ],
        vec!["artifact".to_string(), optional(&item.artifact_name)],
        vec!["version".to_string(), optional(&item.artifact_version)],
        vec!["server".to_string(), optional(&item.server_address)],
    ];
    for (field, value) in &item.extra {
        rows.push(vec![field.clone(), value.to_string()]);
    }
    print_table(&["FIELD", "VALUE"], rows);
    Ok(())
}
