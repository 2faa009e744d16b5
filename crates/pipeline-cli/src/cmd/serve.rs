use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, port: u16) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        tokio::select! {
            res = pipeline_server::serve(root, port) => res.context("pipeline server stopped"),
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}
