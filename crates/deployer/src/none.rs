use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::traits::Deployer;

/// Deployer for runs against a cluster that is managed elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneDeployer;

#[async_trait]
impl Deployer for NoneDeployer {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn bring_up(&self) -> Result<()> {
        info!("Noop bring-up");
        Ok(())
    }

    async fn is_up(&self) -> Result<()> {
        info!("Noop liveness probe");
        Ok(())
    }

    async fn install_access_credentials(&self) -> Result<()> {
        info!("Noop credential install");
        Ok(())
    }

    async fn tear_down(&self) -> Result<()> {
        info!("Noop tear-down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_operation_succeeds() {
        let deployer = NoneDeployer;
        deployer.bring_up().await.unwrap();
        deployer.is_up().await.unwrap();
        deployer.install_access_credentials().await.unwrap();
        deployer.tear_down().await.unwrap();
        deployer.tear_down().await.unwrap();
    }
}
