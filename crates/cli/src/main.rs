use clap::{Parser, Subcommand};
use cloudpilot_aws::AwsClients;
use cloudpilot_core::config::AppConfig;
use cloudpilot_server::gateway::Gateway;
use cloudpilot_tools::ecs::{
    DescribeTaskDefinitionTool, EcsServiceStatusTool, FargateRetirementsTool, ListEcsClustersTool,
    ListEcsServicesTool, ListEcsTasksTool,
};
use cloudpilot_tools::error_envelope;
use cloudpilot_tools::iam::{
    AdminAccessTool, ListAccessKeysTool, ListIamRolesTool, ListIamUsersTool, RoleTrustPolicyTool,
    StaleCredentialsTool,
};
use cloudpilot_tools::lambda::{
    FindDeprecatedRuntimesTool, GetLambdaFunctionTool, ListLambdaFunctionsTool,
    ListLambdaRuntimesTool,
};
use cloudpilot_tools::registry::ToolRegistry;
use cloudpilot_tools::s3::{
    CheckBucketPublicAccessTool, FindObjectTool, GetBucketEncryptionTool, GetBucketSizeTool,
    ListS3BucketsTool,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod verify;

const VERSION: &str = "0.1.0";

#[derive(Parser)]
#[command(name = "cloudpilot")]
#[command(version = VERSION)]
#[command(about = "Conversational AWS inventory queries over IAM, ECS, Lambda, and S3")]
struct Cli {
    /// Path to an alternate config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway serving the query tools
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List registered tools and their parameter schemas
    Tools,
    /// Invoke a single tool and print its result envelope
    Call {
        /// Tool name (e.g. list_iam_users)
        name: String,
        /// JSON arguments for the tool
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
    /// Check AWS credentials via STS GetCallerIdentity
    Verify,
}

async fn build_registry(clients: Arc<AwsClients>) -> ToolRegistry {
    let tools = ToolRegistry::new();

    tools
        .register(Arc::new(ListIamUsersTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(StaleCredentialsTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(AdminAccessTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(ListIamRolesTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(RoleTrustPolicyTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(ListAccessKeysTool::new(clients.clone())))
        .await;

    tools
        .register(Arc::new(ListEcsClustersTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(ListEcsServicesTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(EcsServiceStatusTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(ListEcsTasksTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(DescribeTaskDefinitionTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(FargateRetirementsTool::new(clients.clone())))
        .await;

    tools
        .register(Arc::new(ListLambdaFunctionsTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(FindDeprecatedRuntimesTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(GetLambdaFunctionTool::new(clients.clone())))
        .await;
    tools.register(Arc::new(ListLambdaRuntimesTool::new())).await;

    tools
        .register(Arc::new(ListS3BucketsTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(GetBucketSizeTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(CheckBucketPublicAccessTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(FindObjectTool::new(clients.clone())))
        .await;
    tools
        .register(Arc::new(GetBucketEncryptionTool::new(clients)))
        .await;

    tools
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.clone())
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    let clients = Arc::new(AwsClients::from_env(&config.aws).await);

    match &cli.command {
        Some(Commands::Serve { port }) => {
            let tools = build_registry(clients).await;
            let server_cfg = config.server.clone().unwrap_or_default();
            let port = port.or(server_cfg.port).unwrap_or(8080);
            let gateway = Gateway::new(tools, port, server_cfg.auth_token);

            println!("Cloudpilot gateway started on 0.0.0.0:{port}");
            println!("Press Ctrl+C to stop");
            gateway.start().await?;
        }
        Some(Commands::Tools) => {
            let tools = build_registry(clients).await;
            for def in tools.list_definitions().await {
                println!("{}", serde_json::to_string_pretty(&def)?);
            }
        }
        Some(Commands::Call { name, args }) => {
            let parsed: serde_json::Value = serde_json::from_str(args)
                .map_err(|e| anyhow::anyhow!("--args must be valid JSON: {}", e))?;

            let tools = build_registry(clients).await;
            let tool = tools
                .get(name)
                .await
                .ok_or_else(|| anyhow::anyhow!("Unknown tool '{}'", name))?;

            let envelope = match tool.execute(parsed).await {
                Ok(value) => value,
                Err(err) => error_envelope(&err),
            };
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        Some(Commands::Verify) => {
            verify::run(&clients).await?;
        }
        None => {
            println!("cloudpilot v{VERSION}");
            println!("Use --help for usage.");
        }
    }

    Ok(())
}
