use crate::{parse_args, Tool, ToolError};
use async_trait::async_trait;
use aws_sdk_lambda::types::FunctionConfiguration;
use cloudpilot_aws::{collect_pages, AwsClients, AwsError, Page};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Runtime support tiers, shipped as versioned data so the table can follow
/// the provider's deprecation schedule without code changes.
#[derive(Debug, Deserialize)]
pub struct RuntimeTable {
    pub supported: Vec<String>,
    pub deprecated: BTreeMap<String, String>,
    pub approaching_eol: BTreeMap<String, String>,
    pub recommendation: String,
}

static RUNTIME_TABLE: Lazy<RuntimeTable> = Lazy::new(|| {
    serde_json::from_str(include_str!("../data/lambda_runtimes.json"))
        .expect("bundled lambda_runtimes.json is well-formed")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeTier {
    Deprecated,
    ApproachingEol,
}

impl RuntimeTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeTier::Deprecated => "DEPRECATED",
            RuntimeTier::ApproachingEol => "APPROACHING_EOL",
        }
    }
}

impl RuntimeTable {
    pub fn global() -> &'static RuntimeTable {
        &RUNTIME_TABLE
    }

    pub fn tier(&self, runtime: &str) -> Option<RuntimeTier> {
        if self.deprecated.contains_key(runtime) {
            Some(RuntimeTier::Deprecated)
        } else if self.approaching_eol.contains_key(runtime) {
            Some(RuntimeTier::ApproachingEol)
        } else {
            None
        }
    }

    pub fn reason(&self, runtime: &str) -> Option<&str> {
        self.deprecated
            .get(runtime)
            .or_else(|| self.approaching_eol.get(runtime))
            .map(String::as_str)
    }
}

fn runtime_label(func: &FunctionConfiguration) -> String {
    func.runtime()
        .map(|r| r.as_str().to_string())
        .unwrap_or_else(|| "N/A (container or custom)".to_string())
}

fn code_size_mb(bytes: i64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

fn shape_function(func: &FunctionConfiguration) -> Value {
    let runtime = runtime_label(func);
    let status = RuntimeTable::global().tier(&runtime).map(|t| t.as_str());
    json!({
        "name": func.function_name().unwrap_or_default(),
        "runtime": runtime,
        "deprecation_status": status,
        "memory_mb": func.memory_size(),
        "timeout_seconds": func.timeout(),
        "code_size_mb": code_size_mb(func.code_size()),
        "last_modified": func.last_modified().unwrap_or_default(),
        "description": func.description().unwrap_or_default(),
    })
}

/// Deprecated-or-EOL functions sort ahead of healthy ones, then by name.
fn sort_function_summaries(functions: &mut [Value]) {
    functions.sort_by_cached_key(|f| {
        (
            f["deprecation_status"].is_null(),
            f["name"].as_str().unwrap_or_default().to_string(),
        )
    });
}

async fn list_all_functions(
    client: aws_sdk_lambda::Client,
) -> Result<Vec<FunctionConfiguration>, AwsError> {
    collect_pages(|marker| {
        let client = client.clone();
        async move {
            let out = client
                .list_functions()
                .set_marker(marker)
                .send()
                .await
                .map_err(AwsError::from_sdk)?;
            Ok(Page {
                items: out.functions().to_vec(),
                next_token: out.next_marker().map(str::to_string),
            })
        }
    })
    .await
}

#[derive(Deserialize)]
struct ListFunctionsArgs {
    #[serde(default)]
    region: Option<String>,
}

pub struct ListLambdaFunctionsTool {
    clients: Arc<AwsClients>,
}

impl ListLambdaFunctionsTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for ListLambdaFunctionsTool {
    fn name(&self) -> &str {
        "list_lambda_functions"
    }

    fn description(&self) -> &str {
        "List all Lambda functions with runtime, memory, timeout, and last modified info."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "region": {
                    "type": "string",
                    "description": "AWS region (optional, uses default if not specified)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ListFunctionsArgs = parse_args(args)?;
        let client = match args.region.as_deref() {
            Some(region) => self.clients.lambda_in(region),
            None => self.clients.lambda().clone(),
        };

        let functions = list_all_functions(client).await?;
        let mut shaped: Vec<Value> = functions.iter().map(shape_function).collect();
        sort_function_summaries(&mut shaped);

        Ok(json!({
            "function_count": shaped.len(),
            "functions": shaped,
        }))
    }
}

#[derive(Deserialize)]
struct DeprecatedRuntimesArgs {
    #[serde(default = "default_include_eol")]
    include_approaching_eol: bool,
}

fn default_include_eol() -> bool {
    true
}

pub struct FindDeprecatedRuntimesTool {
    clients: Arc<AwsClients>,
}

impl FindDeprecatedRuntimesTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for FindDeprecatedRuntimesTool {
    fn name(&self) -> &str {
        "find_deprecated_runtimes"
    }

    fn description(&self) -> &str {
        "Find all Lambda functions using deprecated or end-of-life runtimes."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "include_approaching_eol": {
                    "type": "boolean",
                    "description": "Also include runtimes approaching end-of-life (default: true)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: DeprecatedRuntimesArgs = parse_args(args)?;
        let table = RuntimeTable::global();
        let functions = list_all_functions(self.clients.lambda().clone()).await?;

        let mut deprecated = Vec::new();
        let mut approaching_eol = Vec::new();
        for func in &functions {
            let runtime = func.runtime().map(|r| r.as_str()).unwrap_or_default();
            let entry = |reason: &str| {
                json!({
                    "name": func.function_name().unwrap_or_default(),
                    "runtime": runtime,
                    "reason": reason,
                    "last_modified": func.last_modified().unwrap_or_default(),
                })
            };
            match table.tier(runtime) {
                Some(RuntimeTier::Deprecated) => {
                    deprecated.push(entry(table.reason(runtime).unwrap_or_default()));
                }
                Some(RuntimeTier::ApproachingEol) if args.include_approaching_eol => {
                    approaching_eol.push(entry(table.reason(runtime).unwrap_or_default()));
                }
                _ => {}
            }
        }

        let mut runtime_summary: BTreeMap<String, u64> = BTreeMap::new();
        for func in &deprecated {
            let runtime = func["runtime"].as_str().unwrap_or_default().to_string();
            *runtime_summary.entry(runtime).or_insert(0) += 1;
        }

        let mut result = Map::new();
        result.insert(
            "total_functions_scanned".to_string(),
            json!(functions.len()),
        );
        result.insert("deprecated_count".to_string(), json!(deprecated.len()));
        result.insert("deprecated_functions".to_string(), json!(deprecated));
        if args.include_approaching_eol {
            result.insert(
                "approaching_eol_count".to_string(),
                json!(approaching_eol.len()),
            );
            result.insert(
                "approaching_eol_functions".to_string(),
                json!(approaching_eol),
            );
        }
        if !runtime_summary.is_empty() {
            result.insert(
                "deprecated_runtime_summary".to_string(),
                json!(runtime_summary),
            );
        }

        Ok(Value::Object(result))
    }
}

#[derive(Deserialize)]
struct FunctionNameArgs {
    function_name: String,
}

pub struct GetLambdaFunctionTool {
    clients: Arc<AwsClients>,
}

impl GetLambdaFunctionTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for GetLambdaFunctionTool {
    fn name(&self) -> &str {
        "get_lambda_function"
    }

    fn description(&self) -> &str {
        "Get detailed information about a specific Lambda function."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "function_name": {
                    "type": "string",
                    "description": "Name or ARN of the Lambda function"
                }
            },
            "required": ["function_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: FunctionNameArgs = parse_args(args)?;
        let out = self
            .clients
            .lambda()
            .get_function()
            .function_name(args.function_name.as_str())
            .send()
            .await
            .map_err(AwsError::from_sdk)
            .map_err(|err| {
                if err.code() == Some("ResourceNotFoundException") {
                    ToolError::NotFound(format!("Function '{}' not found", args.function_name))
                } else {
                    err.into()
                }
            })?;

        let func = out.configuration().ok_or_else(|| {
            ToolError::NotFound(format!("Function '{}' not found", args.function_name))
        })?;

        let table = RuntimeTable::global();
        let runtime = runtime_label(func);
        let deprecation_info = table.tier(&runtime).map(|tier| {
            let action = match tier {
                RuntimeTier::Deprecated => "Upgrade to a supported runtime immediately",
                RuntimeTier::ApproachingEol => "Plan upgrade to newer runtime",
            };
            json!({
                "status": tier.as_str(),
                "message": table.reason(&runtime).unwrap_or_default(),
                "action_required": action,
            })
        });

        // Environment variables are credential-adjacent; surface names only.
        let mut env_names: Vec<&str> = func
            .environment()
            .and_then(|e| e.variables())
            .map(|vars| vars.keys().map(String::as_str).collect())
            .unwrap_or_default();
        env_names.sort_unstable();

        let tags = out.tags().filter(|t| !t.is_empty());
        let mut architectures: Vec<&str> =
            func.architectures().iter().map(|a| a.as_str()).collect();
        if architectures.is_empty() {
            architectures.push("x86_64");
        }
        let environment_variables = if env_names.is_empty() {
            Value::Null
        } else {
            json!(env_names)
        };
        let layers: Vec<&str> = func
            .layers()
            .iter()
            .filter_map(|layer| layer.arn())
            .filter_map(layer_name_from_arn)
            .collect();

        Ok(json!({
            "name": func.function_name().unwrap_or_default(),
            "arn": func.function_arn().unwrap_or_default(),
            "runtime": runtime,
            "deprecation_info": deprecation_info,
            "handler": func.handler(),
            "role": format_role(func.role()),
            "memory_mb": func.memory_size(),
            "timeout_seconds": func.timeout(),
            "code_size_mb": code_size_mb(func.code_size()),
            "last_modified": func.last_modified().unwrap_or_default(),
            "description": func.description().unwrap_or_default(),
            "state": func.state().map(|s| s.as_str()),
            "architectures": architectures,
            "environment_variables": environment_variables,
            "vpc_config": func.vpc_config().and_then(|v| v.vpc_id()),
            "layers": layers,
            "tags": tags,
        }))
    }
}

fn format_role(role_arn: Option<&str>) -> &str {
    cloudpilot_aws::format::arn_tail(role_arn.unwrap_or(""))
}

/// Layer ARNs look like arn:aws:lambda:region:account:layer:NAME:VERSION.
fn layer_name_from_arn(arn: &str) -> Option<&str> {
    arn.rsplit(':').nth(1)
}

pub struct ListLambdaRuntimesTool;

impl ListLambdaRuntimesTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ListLambdaRuntimesTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ListLambdaRuntimesTool {
    fn name(&self) -> &str {
        "list_lambda_runtimes"
    }

    fn description(&self) -> &str {
        "List all known Lambda runtimes with their deprecation status. Useful for understanding which runtimes are safe to use."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        let table = RuntimeTable::global();
        Ok(json!({
            "supported_runtimes": &table.supported,
            "approaching_eol": &table.approaching_eol,
            "deprecated_runtimes": &table.deprecated,
            "recommendation": &table.recommendation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_lambda::types::Runtime;

    #[test]
    fn runtime_tiers_come_from_the_bundled_table() {
        let table = RuntimeTable::global();
        assert_eq!(table.tier("python2.7"), Some(RuntimeTier::Deprecated));
        assert_eq!(table.tier("nodejs18.x"), Some(RuntimeTier::ApproachingEol));
        assert_eq!(table.tier("python3.12"), None);
        assert_eq!(table.reason("go1.x").unwrap(), "Deprecated since January 2024 - use provided.al2");
    }

    #[test]
    fn code_size_rounds_to_two_decimals() {
        assert_eq!(code_size_mb(0), 0.0);
        assert_eq!(code_size_mb(1_572_864), 1.5);
        assert_eq!(code_size_mb(1_234_567), 1.18);
    }

    fn named_function(name: &str, runtime: &str) -> Value {
        shape_function(
            &FunctionConfiguration::builder()
                .function_name(name)
                .runtime(Runtime::from(runtime))
                .build(),
        )
    }

    #[test]
    fn deprecated_functions_sort_ahead_of_healthy_ones() {
        let mut summaries = vec![
            named_function("zeta", "python3.12"),
            named_function("alpha", "nodejs22.x"),
            named_function("mike", "python2.7"),
        ];
        sort_function_summaries(&mut summaries);

        let names: Vec<&str> = summaries
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["mike", "alpha", "zeta"]);
        assert_eq!(summaries[0]["deprecation_status"], "DEPRECATED");
    }

    #[test]
    fn container_images_have_no_runtime_label() {
        let shaped = shape_function(&FunctionConfiguration::builder().function_name("img").build());
        assert_eq!(shaped["runtime"], "N/A (container or custom)");
        assert!(shaped["deprecation_status"].is_null());
    }

    #[test]
    fn layer_names_are_extracted_from_arns() {
        assert_eq!(
            layer_name_from_arn("arn:aws:lambda:us-east-1:123:layer:shared-utils:5"),
            Some("shared-utils")
        );
    }
}
