use aws_config::{BehaviorVersion, Region, SdkConfig};
use cloudpilot_core::config::AwsSettings;
use once_cell::sync::OnceCell;
use tracing::info;

/// The AWS Health API is only served from us-east-1.
const HEALTH_REGION: &str = "us-east-1";

/// Injectable registry of AWS service clients.
///
/// One client per service for the lifetime of the process, built on first
/// use from the shared `SdkConfig`. Construction is synchronized per
/// service; already-populated entries are read without locking. Credential
/// resolution failures are never cached here — they surface on the first
/// request a client actually sends.
pub struct AwsClients {
    config: SdkConfig,
    iam: OnceCell<aws_sdk_iam::Client>,
    ecs: OnceCell<aws_sdk_ecs::Client>,
    lambda: OnceCell<aws_sdk_lambda::Client>,
    s3: OnceCell<aws_sdk_s3::Client>,
    sts: OnceCell<aws_sdk_sts::Client>,
    health: OnceCell<aws_sdk_health::Client>,
}

impl AwsClients {
    /// Resolve the ambient AWS environment (credential chain, region,
    /// optional profile) into a client registry.
    pub async fn from_env(settings: &AwsSettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &settings.profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;
        info!(
            region = config.region().map(|r| r.as_ref()).unwrap_or("default"),
            "AWS configuration resolved"
        );
        Self::from_config(config)
    }

    pub fn from_config(config: SdkConfig) -> Self {
        Self {
            config,
            iam: OnceCell::new(),
            ecs: OnceCell::new(),
            lambda: OnceCell::new(),
            s3: OnceCell::new(),
            sts: OnceCell::new(),
            health: OnceCell::new(),
        }
    }

    pub fn iam(&self) -> &aws_sdk_iam::Client {
        self.iam
            .get_or_init(|| aws_sdk_iam::Client::new(&self.config))
    }

    pub fn ecs(&self) -> &aws_sdk_ecs::Client {
        self.ecs
            .get_or_init(|| aws_sdk_ecs::Client::new(&self.config))
    }

    pub fn lambda(&self) -> &aws_sdk_lambda::Client {
        self.lambda
            .get_or_init(|| aws_sdk_lambda::Client::new(&self.config))
    }

    /// Lambda client for an explicit region override. Not cached: a one-off
    /// region gets a one-off client.
    pub fn lambda_in(&self, region: &str) -> aws_sdk_lambda::Client {
        let conf = aws_sdk_lambda::config::Builder::from(&self.config)
            .region(Region::new(region.to_string()))
            .build();
        aws_sdk_lambda::Client::from_conf(conf)
    }

    pub fn s3(&self) -> &aws_sdk_s3::Client {
        self.s3.get_or_init(|| aws_sdk_s3::Client::new(&self.config))
    }

    pub fn sts(&self) -> &aws_sdk_sts::Client {
        self.sts
            .get_or_init(|| aws_sdk_sts::Client::new(&self.config))
    }

    pub fn health(&self) -> &aws_sdk_health::Client {
        self.health.get_or_init(|| {
            let conf = aws_sdk_health::config::Builder::from(&self.config)
                .region(Region::new(HEALTH_REGION))
                .build();
            aws_sdk_health::Client::from_conf(conf)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config() -> SdkConfig {
        SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("eu-west-1"))
            .build()
    }

    #[test]
    fn clients_are_built_once_per_service() {
        let clients = AwsClients::from_config(bare_config());
        let first = clients.iam() as *const aws_sdk_iam::Client;
        let second = clients.iam() as *const aws_sdk_iam::Client;
        assert_eq!(first, second);
    }

    #[test]
    fn health_client_is_pinned_to_us_east_1() {
        let clients = AwsClients::from_config(bare_config());
        let region = clients.health().config().region().cloned();
        assert_eq!(region.map(|r| r.to_string()), Some("us-east-1".into()));
    }

    #[test]
    fn regional_lambda_override_is_honored() {
        let clients = AwsClients::from_config(bare_config());
        let client = clients.lambda_in("ap-southeast-2");
        let region = client.config().region().cloned();
        assert_eq!(region.map(|r| r.to_string()), Some("ap-southeast-2".into()));
    }
}
