use crate::{parse_args, Tool, ToolError};
use async_trait::async_trait;
use aws_sdk_s3::operation::get_bucket_encryption::GetBucketEncryptionOutput;
use aws_sdk_s3::types::{Object, PublicAccessBlockConfiguration};
use cloudpilot_aws::format::{human_size, iso8601};
use cloudpilot_aws::{collect_pages, AwsClients, AwsError, Page};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Cross-bucket searches stop after this many matches to keep the response
/// a readable size.
const MATCH_CAP: usize = 50;

async fn list_bucket_names(clients: &AwsClients) -> Result<Vec<String>, AwsError> {
    let out = clients
        .s3()
        .list_buckets()
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    Ok(out
        .buckets()
        .iter()
        .filter_map(|b| b.name())
        .map(str::to_string)
        .collect())
}

fn key_matches(key: &str, needle: &str, exact: bool) -> bool {
    if exact {
        key == needle
    } else {
        key.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// Scan one page of objects, appending matches. Returns true once the cap
/// is reached, at which point the caller stops searching entirely.
fn scan_objects(
    bucket: &str,
    objects: &[Object],
    needle: &str,
    exact: bool,
    matches: &mut Vec<Value>,
) -> bool {
    for obj in objects {
        let key = match obj.key() {
            Some(key) => key,
            None => continue,
        };
        if !key_matches(key, needle, exact) {
            continue;
        }
        matches.push(json!({
            "bucket": bucket,
            "key": key,
            "size": human_size(obj.size().unwrap_or(0).max(0) as u64),
            "last_modified": obj
                .last_modified()
                .map(iso8601)
                .unwrap_or_else(|| "Unknown".to_string()),
        }));
        if matches.len() >= MATCH_CAP {
            return true;
        }
    }
    false
}

/// Shape one bucket's public-access-block state. A missing configuration is
/// itself a finding, and a failed check is recorded rather than raised.
fn public_access_record(
    bucket: &str,
    result: Result<Option<PublicAccessBlockConfiguration>, AwsError>,
) -> Value {
    let mut blocked = true;
    let mut issues: Vec<String> = Vec::new();

    match result {
        Ok(Some(config)) => {
            let guards = [
                ("BlockPublicAcls", config.block_public_acls()),
                ("IgnorePublicAcls", config.ignore_public_acls()),
                ("BlockPublicPolicy", config.block_public_policy()),
                ("RestrictPublicBuckets", config.restrict_public_buckets()),
            ];
            for (name, enabled) in guards {
                if !enabled.unwrap_or(false) {
                    issues.push(format!("{name} is disabled"));
                    blocked = false;
                }
            }
        }
        Ok(None) => {
            issues.push("No public access block configured".to_string());
            blocked = false;
        }
        Err(err) if err.code() == Some("NoSuchPublicAccessBlockConfiguration") => {
            issues.push("No public access block configured".to_string());
            blocked = false;
        }
        Err(err) => {
            issues.push(format!("Error checking: {err}"));
        }
    }

    json!({
        "bucket": bucket,
        "public_access_blocked": blocked,
        "issues": issues,
    })
}

/// Shape one bucket's encryption state. The provider's "no configuration"
/// error simply means the bucket is unencrypted.
fn encryption_record(bucket: &str, result: Result<GetBucketEncryptionOutput, AwsError>) -> Value {
    match result {
        Ok(out) => {
            let rules = out
                .server_side_encryption_configuration()
                .map(|c| c.rules())
                .unwrap_or_default();
            match rules.first() {
                Some(rule) => {
                    let sse = rule.apply_server_side_encryption_by_default();
                    let mut record = json!({
                        "bucket": bucket,
                        "encryption_enabled": true,
                        "encryption_type": sse
                            .map(|s| s.sse_algorithm().as_str())
                            .unwrap_or("Unknown"),
                    });
                    if let Some(kms_key) = sse.and_then(|s| s.kms_master_key_id()) {
                        record["kms_key_id"] = json!(kms_key);
                    }
                    record
                }
                None => json!({
                    "bucket": bucket,
                    "encryption_enabled": false,
                    "encryption_type": Value::Null,
                }),
            }
        }
        Err(err) if err.code() == Some("ServerSideEncryptionConfigurationNotFoundError") => {
            json!({
                "bucket": bucket,
                "encryption_enabled": false,
                "encryption_type": "None",
            })
        }
        Err(err) => json!({
            "bucket": bucket,
            "encryption_enabled": false,
            "encryption_type": Value::Null,
            "error": err.to_string(),
        }),
    }
}

fn encryption_summary(records: Vec<Value>) -> Value {
    let encrypted = records
        .iter()
        .filter(|r| r["encryption_enabled"] == true)
        .count();
    let unencrypted: Vec<Value> = records
        .iter()
        .filter(|r| r["encryption_enabled"] == false && r.get("error").is_none())
        .map(|r| r["bucket"].clone())
        .collect();
    let unencrypted_buckets = if unencrypted.is_empty() {
        Value::Null
    } else {
        json!(unencrypted)
    };

    json!({
        "buckets_checked": records.len(),
        "encrypted_count": encrypted,
        "unencrypted_count": unencrypted.len(),
        "unencrypted_buckets": unencrypted_buckets,
        "buckets": records,
    })
}

pub struct ListS3BucketsTool {
    clients: Arc<AwsClients>,
}

impl ListS3BucketsTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for ListS3BucketsTool {
    fn name(&self) -> &str {
        "list_s3_buckets"
    }

    fn description(&self) -> &str {
        "List all S3 buckets in the AWS account with region and creation date."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        let s3 = self.clients.s3();
        let out = s3.list_buckets().send().await.map_err(AwsError::from_sdk)?;

        let mut buckets = Vec::new();
        for bucket in out.buckets() {
            let name = match bucket.name() {
                Some(name) => name,
                None => continue,
            };

            // A region probe can fail on its own without sinking the listing.
            let region = match s3.get_bucket_location().bucket(name).send().await {
                Ok(location) => location
                    .location_constraint()
                    .map(|c| c.as_str().to_string())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| "us-east-1".to_string()),
                Err(_) => "unknown".to_string(),
            };

            buckets.push(json!({
                "name": name,
                "region": region,
                "created": bucket
                    .creation_date()
                    .map(iso8601)
                    .unwrap_or_else(|| "Unknown".to_string()),
            }));
        }

        Ok(json!({ "bucket_count": buckets.len(), "buckets": buckets }))
    }
}

#[derive(Deserialize)]
struct BucketNameArgs {
    bucket_name: String,
}

pub struct GetBucketSizeTool {
    clients: Arc<AwsClients>,
}

impl GetBucketSizeTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for GetBucketSizeTool {
    fn name(&self) -> &str {
        "get_bucket_size"
    }

    fn description(&self) -> &str {
        "Get the total size and object count for an S3 bucket. Iterates through all objects, so may be slow for very large buckets."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "bucket_name": {
                    "type": "string",
                    "description": "Name of the S3 bucket"
                }
            },
            "required": ["bucket_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: BucketNameArgs = parse_args(args)?;
        let s3 = self.clients.s3().clone();
        let bucket = args.bucket_name.clone();

        let objects = collect_pages(|token| {
            let s3 = s3.clone();
            let bucket = bucket.clone();
            async move {
                let out = s3
                    .list_objects_v2()
                    .bucket(bucket)
                    .set_continuation_token(token)
                    .send()
                    .await
                    .map_err(AwsError::from_sdk)?;
                Ok(Page {
                    items: out.contents().to_vec(),
                    next_token: out.next_continuation_token().map(str::to_string),
                })
            }
        })
        .await?;

        let total_size: i64 = objects.iter().filter_map(|o| o.size()).sum();
        Ok(json!({
            "bucket": args.bucket_name,
            "object_count": objects.len(),
            "total_size_bytes": total_size,
            "total_size_human": human_size(total_size.max(0) as u64),
        }))
    }
}

#[derive(Deserialize)]
struct OptionalBucketArgs {
    #[serde(default)]
    bucket_name: Option<String>,
}

pub struct CheckBucketPublicAccessTool {
    clients: Arc<AwsClients>,
}

impl CheckBucketPublicAccessTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for CheckBucketPublicAccessTool {
    fn name(&self) -> &str {
        "check_bucket_public_access"
    }

    fn description(&self) -> &str {
        "Check public access settings for a specific bucket or all buckets. Identifies buckets that may be publicly accessible."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "bucket_name": {
                    "type": "string",
                    "description": "Specific bucket to check (optional, defaults to all buckets)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: OptionalBucketArgs = parse_args(args)?;
        let s3 = self.clients.s3();

        let bucket_names = match args.bucket_name {
            Some(name) => vec![name],
            None => list_bucket_names(&self.clients).await?,
        };

        let mut records = Vec::new();
        for name in &bucket_names {
            let result = s3
                .get_public_access_block()
                .bucket(name.as_str())
                .send()
                .await
                .map(|out| out.public_access_block_configuration().cloned())
                .map_err(AwsError::from_sdk);
            records.push(public_access_record(name, result));
        }

        let public_count = records
            .iter()
            .filter(|r| r["public_access_blocked"] == false)
            .count();

        Ok(json!({
            "buckets_checked": records.len(),
            "potentially_public_count": public_count,
            "buckets": records,
        }))
    }
}

#[derive(Deserialize)]
struct FindObjectArgs {
    object_name: String,
    #[serde(default)]
    exact_match: bool,
}

pub struct FindObjectTool {
    clients: Arc<AwsClients>,
}

impl FindObjectTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }

    /// Search one bucket's full listing. Returns true when the global match
    /// cap was reached mid-bucket.
    async fn search_bucket(
        &self,
        bucket: &str,
        needle: &str,
        exact: bool,
        matches: &mut Vec<Value>,
    ) -> Result<bool, AwsError> {
        let s3 = self.clients.s3();
        let mut token: Option<String> = None;

        loop {
            let out = s3
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            if scan_objects(bucket, out.contents(), needle, exact, matches) {
                return Ok(true);
            }

            match out.next_continuation_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_string()),
                _ => return Ok(false),
            }
        }
    }
}

#[async_trait]
impl Tool for FindObjectTool {
    fn name(&self) -> &str {
        "find_object"
    }

    fn description(&self) -> &str {
        "Search across all S3 buckets to find which bucket(s) contain an object, by exact key or substring match."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "object_name": {
                    "type": "string",
                    "description": "The object key/name to search for"
                },
                "exact_match": {
                    "type": "boolean",
                    "description": "If true, only match exact object keys. If false, match objects containing the search term."
                }
            },
            "required": ["object_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: FindObjectArgs = parse_args(args)?;
        info!(term = %args.object_name, exact = args.exact_match, "Object search");

        let bucket_names = list_bucket_names(&self.clients).await?;

        let mut matches = Vec::new();
        let mut buckets_searched = 0usize;
        let mut buckets_with_errors = Vec::new();

        for bucket in &bucket_names {
            buckets_searched += 1;
            match self
                .search_bucket(bucket, &args.object_name, args.exact_match, &mut matches)
                .await
            {
                Ok(true) => {
                    return Ok(json!({
                        "search_term": args.object_name,
                        "exact_match": args.exact_match,
                        "match_count": matches.len(),
                        "truncated": true,
                        "message": format!("Results limited to {MATCH_CAP} matches"),
                        "buckets_searched": buckets_searched,
                        "matches": matches,
                    }));
                }
                Ok(false) => {}
                // One unreadable bucket must not end the search.
                Err(err) => buckets_with_errors.push(json!({
                    "bucket": bucket,
                    "error": err.to_string(),
                })),
            }
        }

        let bucket_errors = if buckets_with_errors.is_empty() {
            Value::Null
        } else {
            json!(buckets_with_errors)
        };
        Ok(json!({
            "search_term": args.object_name,
            "exact_match": args.exact_match,
            "match_count": matches.len(),
            "truncated": false,
            "buckets_searched": buckets_searched,
            "buckets_with_errors": bucket_errors,
            "matches": matches,
        }))
    }
}

pub struct GetBucketEncryptionTool {
    clients: Arc<AwsClients>,
}

impl GetBucketEncryptionTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for GetBucketEncryptionTool {
    fn name(&self) -> &str {
        "get_bucket_encryption"
    }

    fn description(&self) -> &str {
        "Check encryption configuration for a specific bucket or all buckets."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "bucket_name": {
                    "type": "string",
                    "description": "Specific bucket to check (optional, defaults to all buckets)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: OptionalBucketArgs = parse_args(args)?;
        let s3 = self.clients.s3();

        let bucket_names = match args.bucket_name {
            Some(name) => vec![name],
            None => list_bucket_names(&self.clients).await?,
        };

        let mut records = Vec::new();
        for name in &bucket_names {
            let result = s3
                .get_bucket_encryption()
                .bucket(name.as_str())
                .send()
                .await
                .map_err(AwsError::from_sdk);
            records.push(encryption_record(name, result));
        }

        Ok(encryption_summary(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::types::{
        ServerSideEncryption, ServerSideEncryptionByDefault, ServerSideEncryptionConfiguration,
        ServerSideEncryptionRule,
    };
    use aws_smithy_types::DateTime as SmithyDateTime;

    #[test]
    fn substring_matching_is_case_insensitive() {
        assert!(key_matches("Logs/App.LOG", "app.log", false));
        assert!(!key_matches("Logs/App.LOG", "app.log", true));
        assert!(key_matches("data/report.csv", "data/report.csv", true));
    }

    fn object(key: &str, size: i64) -> Object {
        Object::builder()
            .key(key)
            .size(size)
            .last_modified(SmithyDateTime::from_secs(1_700_000_000))
            .build()
    }

    #[test]
    fn scan_stops_exactly_at_the_match_cap() {
        let objects: Vec<Object> = (0..60).map(|i| object(&format!("report-{i}.csv"), 10)).collect();
        let mut matches = Vec::new();

        let capped = scan_objects("archive", &objects, "report", false, &mut matches);

        assert!(capped);
        assert_eq!(matches.len(), MATCH_CAP);
        assert_eq!(matches[0]["bucket"], "archive");
    }

    #[test]
    fn scan_below_cap_reports_all_matches() {
        let objects = vec![object("a/report.csv", 1536), object("b/notes.txt", 10)];
        let mut matches = Vec::new();

        let capped = scan_objects("archive", &objects, "report", false, &mut matches);

        assert!(!capped);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["size"], "1.50 KB");
    }

    #[test]
    fn fully_guarded_bucket_has_no_issues() {
        let config = PublicAccessBlockConfiguration::builder()
            .block_public_acls(true)
            .ignore_public_acls(true)
            .block_public_policy(true)
            .restrict_public_buckets(true)
            .build();
        let record = public_access_record("safe", Ok(Some(config)));
        assert_eq!(record["public_access_blocked"], true);
        assert_eq!(record["issues"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn each_disabled_guard_is_an_issue() {
        let config = PublicAccessBlockConfiguration::builder()
            .block_public_acls(false)
            .ignore_public_acls(true)
            .block_public_policy(true)
            .build();
        let record = public_access_record("loose", Ok(Some(config)));
        assert_eq!(record["public_access_blocked"], false);
        let issues = record["issues"].as_array().unwrap();
        // BlockPublicAcls disabled plus the unset RestrictPublicBuckets.
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0], "BlockPublicAcls is disabled");
    }

    #[test]
    fn missing_configuration_is_flagged_not_fatal() {
        let err = AwsError::Api {
            code: Some("NoSuchPublicAccessBlockConfiguration".to_string()),
            message: "no configuration".to_string(),
        };
        let record = public_access_record("bare", Err(err));
        assert_eq!(record["public_access_blocked"], false);
        assert_eq!(record["issues"][0], "No public access block configured");
    }

    #[test]
    fn unrelated_check_errors_are_recorded_in_place() {
        let record = public_access_record("denied", Err(AwsError::api("AccessDenied")));
        assert_eq!(record["public_access_blocked"], true);
        assert!(record["issues"][0]
            .as_str()
            .unwrap()
            .starts_with("Error checking:"));
    }

    fn encrypted_output(algorithm: ServerSideEncryption, kms: Option<&str>) -> GetBucketEncryptionOutput {
        let mut sse = ServerSideEncryptionByDefault::builder().sse_algorithm(algorithm);
        if let Some(kms) = kms {
            sse = sse.kms_master_key_id(kms);
        }
        GetBucketEncryptionOutput::builder()
            .server_side_encryption_configuration(
                ServerSideEncryptionConfiguration::builder()
                    .rules(
                        ServerSideEncryptionRule::builder()
                            .apply_server_side_encryption_by_default(sse.build().unwrap())
                            .build(),
                    )
                    .build()
                    .unwrap(),
            )
            .build()
    }

    #[test]
    fn kms_encryption_surfaces_the_key_id() {
        let record = encryption_record(
            "vault",
            Ok(encrypted_output(ServerSideEncryption::AwsKms, Some("key-123"))),
        );
        assert_eq!(record["encryption_enabled"], true);
        assert_eq!(record["encryption_type"], "aws:kms");
        assert_eq!(record["kms_key_id"], "key-123");
    }

    #[test]
    fn missing_encryption_configuration_means_unencrypted() {
        let err = AwsError::Api {
            code: Some("ServerSideEncryptionConfigurationNotFoundError".to_string()),
            message: "not found".to_string(),
        };
        let record = encryption_record("plain", Err(err));
        assert_eq!(record["encryption_enabled"], false);
        assert_eq!(record["encryption_type"], "None");
    }

    #[test]
    fn summary_counts_skip_errored_buckets() {
        let records = vec![
            encryption_record(
                "vault",
                Ok(encrypted_output(ServerSideEncryption::Aes256, None)),
            ),
            encryption_record(
                "plain",
                Err(AwsError::Api {
                    code: Some("ServerSideEncryptionConfigurationNotFoundError".to_string()),
                    message: "not found".to_string(),
                }),
            ),
            encryption_record("denied", Err(AwsError::api("AccessDenied"))),
        ];
        let summary = encryption_summary(records);
        assert_eq!(summary["buckets_checked"], 3);
        assert_eq!(summary["encrypted_count"], 1);
        assert_eq!(summary["unencrypted_count"], 1);
        assert_eq!(summary["unencrypted_buckets"][0], "plain");
    }
}
