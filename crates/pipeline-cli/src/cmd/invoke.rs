use super::open_ledger;
use crate::output::print_bytes;
use anyhow::Context;
use pipeline_core::dispatch;
use std::path::Path;

pub fn run(root: &Path, function: &str, args: &[String]) -> anyhow::Result<()> {
    let (config, ledger) = open_ledger(root)?;
    let bytes = dispatch::invoke(&ledger, &config.workflow, function, args)
        .with_context(|| format!("{function} failed"))?;
    print_bytes(&bytes)
}
