use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub aws: AwsSettings,
    pub server: Option<ServerConfig>,
}

/// AWS connection settings. Everything is optional: when unset, the SDK's
/// ambient credential/region resolution chain applies.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub profile: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ServerConfig {
    pub port: Option<u16>,
    pub auth_token: Option<String>,
}

impl AppConfig {
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = if let Some(path) = custom_path {
            path
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".cloudpilot/config.json")
        };

        let s = Config::builder()
            .add_source(File::from(config_path).required(false))
            // Environment variables (CLOUDPILOT_AWS__REGION etc.)
            .add_source(Environment::with_prefix("CLOUDPILOT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
