use std::path::Path;

use crate::error::{DeployError, Result};
use crate::process::{CommandRunner, CommandSpec};

/// Succeeds once `kubectl` lists at least `min_nodes` nodes.
pub async fn nodes_ready(
    runner: &dyn CommandRunner,
    workdir: &Path,
    kubeconfig: &Path,
    min_nodes: usize,
) -> Result<()> {
    let spec = CommandSpec::new("kubectl")
        .args(["get", "nodes", "--no-headers"])
        .current_dir(workdir)
        .env("KUBECONFIG", kubeconfig.display().to_string());
    let out = runner.output(&spec).await?;

    let count = out.lines().filter(|line| !line.trim().is_empty()).count();
    if count == 0 || count < min_nodes {
        return Err(DeployError::NotReady(format!(
            "found {} nodes, want at least {}",
            count,
            min_nodes.max(1)
        )));
    }
    Ok(())
}
