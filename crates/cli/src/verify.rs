use anyhow::Result;
use cloudpilot_aws::{AwsClients, AwsError};
use tracing::info;

/// Preflight check: ask STS who we are. Fails with a configuration hint
/// when the ambient credential chain is empty or expired.
pub async fn run(clients: &AwsClients) -> Result<()> {
    println!("Checking AWS credentials...");

    match clients.sts().get_caller_identity().send().await {
        Ok(identity) => {
            info!("STS caller identity resolved");
            println!("✅ Connected as: {}", identity.arn().unwrap_or("unknown"));
            println!("✅ Account: {}", identity.account().unwrap_or("unknown"));
            Ok(())
        }
        Err(err) => {
            anyhow::bail!(
                "❌ AWS credential check failed: {}. Make sure your AWS credentials are configured (run 'aws configure').",
                AwsError::from_sdk(err)
            )
        }
    }
}
