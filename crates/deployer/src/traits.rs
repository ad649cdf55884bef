use async_trait::async_trait;

use crate::error::Result;

/// Lifecycle contract every cluster backend implements.
///
/// `bring_up` converges to a running cluster even when one already exists.
/// `tear_down` succeeds when there is nothing to tear down and tolerates
/// being invoked again, including concurrently from the interrupt handler.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Name of the backend, as accepted by `--deployment`.
    fn name(&self) -> &'static str;

    async fn bring_up(&self) -> Result<()>;

    /// Health probe. Never mutates the cluster.
    async fn is_up(&self) -> Result<()>;

    /// Make the cluster reachable through the run's kubeconfig.
    async fn install_access_credentials(&self) -> Result<()>;

    async fn tear_down(&self) -> Result<()>;
}
