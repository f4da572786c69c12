pub mod ecs;
pub mod iam;
pub mod lambda;
pub mod registry;
pub mod s3;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{0}")]
    Api(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Entitlement { message: String, suggestion: String },
}

impl From<cloudpilot_aws::AwsError> for ToolError {
    fn from(err: cloudpilot_aws::AwsError) -> Self {
        ToolError::Api(err.to_string())
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value; // JSON Schema
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Collapse a tool failure into the error envelope. Success envelopes come
/// straight from the tool, so exactly one of the two shapes ever reaches
/// the caller.
pub fn error_envelope(err: &ToolError) -> Value {
    match err {
        ToolError::Entitlement {
            message,
            suggestion,
        } => json!({
            "error": message,
            "suggestion": suggestion,
        }),
        other => json!({ "error": other.to_string() }),
    }
}

/// Deserialize tool arguments into a typed struct. A `null` body counts as
/// an empty mapping so argument-free invocations stay valid.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArgs(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn error_envelope_carries_only_the_error_key() {
        let envelope = error_envelope(&ToolError::Api("throttled".into()));
        let map = envelope.as_object().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["error"], "throttled");
    }

    #[test]
    fn entitlement_envelope_adds_a_suggestion() {
        let envelope = error_envelope(&ToolError::Entitlement {
            message: "support plan required".into(),
            suggestion: "upgrade the plan".into(),
        });
        let map = envelope.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["error"], "support plan required");
        assert_eq!(map["suggestion"], "upgrade the plan");
    }

    #[derive(Debug, Deserialize)]
    struct DaysArgs {
        #[serde(default = "default_days")]
        days: i64,
    }

    fn default_days() -> i64 {
        90
    }

    #[test]
    fn null_arguments_fall_back_to_defaults() {
        let args: DaysArgs = parse_args(Value::Null).unwrap();
        assert_eq!(args.days, 90);
    }

    #[test]
    fn mistyped_arguments_are_rejected_descriptively() {
        let err = parse_args::<DaysArgs>(json!({ "days": "ninety" })).unwrap_err();
        match err {
            ToolError::InvalidArgs(msg) => assert!(msg.contains("invalid type")),
            other => panic!("expected InvalidArgs, got {other:?}"),
        }
    }
}
