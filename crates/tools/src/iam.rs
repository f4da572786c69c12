use crate::{parse_args, Tool, ToolError};
use async_trait::async_trait;
use aws_sdk_iam::types::{AccessKeyMetadata, Role, User};
use chrono::{DateTime, Utc};
use cloudpilot_aws::format;
use cloudpilot_aws::{collect_pages, AwsClients, AwsError, Page};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const ADMIN_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AdministratorAccess";

async fn list_all_users(clients: &AwsClients) -> Result<Vec<User>, AwsError> {
    let iam = clients.iam().clone();
    collect_pages(|marker| {
        let iam = iam.clone();
        async move {
            let out = iam
                .list_users()
                .set_marker(marker)
                .send()
                .await
                .map_err(AwsError::from_sdk)?;
            Ok(Page {
                items: out.users().to_vec(),
                next_token: out.marker().map(str::to_string),
            })
        }
    })
    .await
}

fn shape_user(user: &User) -> Value {
    json!({
        "username": user.user_name(),
        "user_id": user.user_id(),
        "created": format::iso8601(user.create_date()),
        "password_last_used": user
            .password_last_used()
            .map(format::iso8601)
            .unwrap_or_else(|| "Never".to_string()),
    })
}

/// A key is stale once its age strictly exceeds the threshold; a key exactly
/// at the threshold is still fresh.
fn stale_key_entry(
    username: &str,
    key: &AccessKeyMetadata,
    now: DateTime<Utc>,
    threshold_days: i64,
) -> Option<Value> {
    let created = key.create_date()?;
    let age = format::age_days(created, now);
    if age <= threshold_days {
        return None;
    }
    Some(json!({
        "username": username,
        "access_key_id": key.access_key_id().unwrap_or_default(),
        "key_age_days": age,
        "status": key.status().map(|s| s.as_str()).unwrap_or("Unknown"),
        "created": format::iso8601(created),
    }))
}

/// Every satisfying source is recorded, not just the first: a user can hold
/// admin rights both directly and through several groups at once.
fn admin_sources(attached_policy_arns: &[&str], group_policies: &[(&str, Vec<&str>)]) -> Vec<String> {
    let mut sources = Vec::new();
    if attached_policy_arns.iter().any(|arn| *arn == ADMIN_POLICY_ARN) {
        sources.push("direct_attachment".to_string());
    }
    for (group, arns) in group_policies {
        if arns.iter().any(|arn| *arn == ADMIN_POLICY_ARN) {
            sources.push(format!("group:{group}"));
        }
    }
    sources
}

fn decode_policy_document(doc: &str) -> Value {
    let decoded = urlencoding::decode(doc)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| doc.to_string());
    serde_json::from_str(&decoded).unwrap_or(Value::String(decoded))
}

pub struct ListIamUsersTool {
    clients: Arc<AwsClients>,
}

impl ListIamUsersTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for ListIamUsersTool {
    fn name(&self) -> &str {
        "list_iam_users"
    }

    fn description(&self) -> &str {
        "List all IAM users in the AWS account with creation dates and password last used dates."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        let users = list_all_users(&self.clients).await?;
        let shaped: Vec<Value> = users.iter().map(shape_user).collect();
        Ok(json!({ "user_count": shaped.len(), "users": shaped }))
    }
}

#[derive(Deserialize)]
struct StaleCredentialArgs {
    #[serde(default = "default_stale_days")]
    days: i64,
}

fn default_stale_days() -> i64 {
    90
}

pub struct StaleCredentialsTool {
    clients: Arc<AwsClients>,
}

impl StaleCredentialsTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for StaleCredentialsTool {
    fn name(&self) -> &str {
        "list_users_with_stale_credentials"
    }

    fn description(&self) -> &str {
        "Find IAM users with access keys that haven't been rotated in the specified number of days."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "days": {
                    "type": "integer",
                    "description": "Number of days to consider credentials stale (default: 90)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: StaleCredentialArgs = parse_args(args)?;
        let iam = self.clients.iam();
        let now = Utc::now();

        let mut stale = Vec::new();
        for user in list_all_users(&self.clients).await? {
            let username = user.user_name();
            let keys = iam
                .list_access_keys()
                .user_name(username)
                .send()
                .await
                .map_err(AwsError::from_sdk)?;
            for key in keys.access_key_metadata() {
                if let Some(entry) = stale_key_entry(username, key, now, args.days) {
                    stale.push(entry);
                }
            }
        }

        Ok(json!({
            "threshold_days": args.days,
            "stale_credential_count": stale.len(),
            "users": stale,
        }))
    }
}

pub struct AdminAccessTool {
    clients: Arc<AwsClients>,
}

impl AdminAccessTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for AdminAccessTool {
    fn name(&self) -> &str {
        "list_users_with_admin_access"
    }

    fn description(&self) -> &str {
        "Find IAM users who have the AdministratorAccess policy attached directly or through groups."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        let iam = self.clients.iam();
        let mut admin_users = Vec::new();

        for user in list_all_users(&self.clients).await? {
            let username = user.user_name();

            let attached = iam
                .list_attached_user_policies()
                .user_name(username)
                .send()
                .await
                .map_err(AwsError::from_sdk)?;
            let direct: Vec<&str> = attached
                .attached_policies()
                .iter()
                .filter_map(|p| p.policy_arn())
                .collect();

            let groups = iam
                .list_groups_for_user()
                .user_name(username)
                .send()
                .await
                .map_err(AwsError::from_sdk)?;
            let mut group_policies: Vec<(String, Vec<String>)> = Vec::new();
            for group in groups.groups() {
                let group_name = group.group_name();
                let policies = iam
                    .list_attached_group_policies()
                    .group_name(group_name)
                    .send()
                    .await
                    .map_err(AwsError::from_sdk)?;
                let arns = policies
                    .attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_arn())
                    .map(str::to_string)
                    .collect();
                group_policies.push((group_name.to_string(), arns));
            }

            let borrowed: Vec<(&str, Vec<&str>)> = group_policies
                .iter()
                .map(|(g, arns)| (g.as_str(), arns.iter().map(String::as_str).collect()))
                .collect();
            let sources = admin_sources(&direct, &borrowed);
            if !sources.is_empty() {
                admin_users.push(json!({
                    "username": username,
                    "admin_source": sources,
                }));
            }
        }

        Ok(json!({
            "admin_user_count": admin_users.len(),
            "users": admin_users,
        }))
    }
}

#[derive(Deserialize)]
struct ListRolesArgs {
    #[serde(default = "default_path_prefix")]
    path_prefix: String,
}

fn default_path_prefix() -> String {
    "/".to_string()
}

fn shape_role(role: &Role) -> Value {
    json!({
        "role_name": role.role_name(),
        "role_id": role.role_id(),
        "path": role.path(),
        "created": format::iso8601(role.create_date()),
        "description": role.description().unwrap_or_default(),
    })
}

pub struct ListIamRolesTool {
    clients: Arc<AwsClients>,
}

impl ListIamRolesTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for ListIamRolesTool {
    fn name(&self) -> &str {
        "list_iam_roles"
    }

    fn description(&self) -> &str {
        "List IAM roles, optionally filtered by path prefix."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path_prefix": {
                    "type": "string",
                    "description": "Filter roles by path (default: \"/\" for all roles)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ListRolesArgs = parse_args(args)?;
        let iam = self.clients.iam().clone();
        let path_prefix = args.path_prefix.clone();

        let roles = collect_pages(|marker| {
            let iam = iam.clone();
            let path_prefix = path_prefix.clone();
            async move {
                let out = iam
                    .list_roles()
                    .path_prefix(path_prefix)
                    .set_marker(marker)
                    .send()
                    .await
                    .map_err(AwsError::from_sdk)?;
                Ok(Page {
                    items: out.roles().to_vec(),
                    next_token: out.marker().map(str::to_string),
                })
            }
        })
        .await?;

        let shaped: Vec<Value> = roles.iter().map(shape_role).collect();
        Ok(json!({ "role_count": shaped.len(), "roles": shaped }))
    }
}

#[derive(Deserialize)]
struct RoleNameArgs {
    role_name: String,
}

pub struct RoleTrustPolicyTool {
    clients: Arc<AwsClients>,
}

impl RoleTrustPolicyTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for RoleTrustPolicyTool {
    fn name(&self) -> &str {
        "get_role_trust_policy"
    }

    fn description(&self) -> &str {
        "Get the trust policy for a specific IAM role. Shows who/what can assume this role."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "role_name": {
                    "type": "string",
                    "description": "The name of the IAM role"
                }
            },
            "required": ["role_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: RoleNameArgs = parse_args(args)?;
        let out = self
            .clients
            .iam()
            .get_role()
            .role_name(args.role_name.as_str())
            .send()
            .await
            .map_err(AwsError::from_sdk)
            .map_err(|err| {
                if err.code() == Some("NoSuchEntity") {
                    ToolError::NotFound(format!("Role '{}' not found", args.role_name))
                } else {
                    err.into()
                }
            })?;

        let role = out
            .role()
            .ok_or_else(|| ToolError::NotFound(format!("Role '{}' not found", args.role_name)))?;
        let trust_policy = role
            .assume_role_policy_document()
            .map(decode_policy_document)
            .unwrap_or(Value::Null);

        Ok(json!({
            "role_name": role.role_name(),
            "trust_policy": trust_policy,
        }))
    }
}

#[derive(Deserialize)]
struct ListAccessKeysArgs {
    #[serde(default)]
    username: Option<String>,
}

pub struct ListAccessKeysTool {
    clients: Arc<AwsClients>,
}

impl ListAccessKeysTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for ListAccessKeysTool {
    fn name(&self) -> &str {
        "list_access_keys"
    }

    fn description(&self) -> &str {
        "List access keys for a specific user or all users, with age and last-used information."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "username": {
                    "type": "string",
                    "description": "Specific user to check (optional, defaults to all users)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ListAccessKeysArgs = parse_args(args)?;
        let iam = self.clients.iam();
        let now = Utc::now();

        let usernames = match args.username {
            Some(username) => vec![username],
            None => list_all_users(&self.clients)
                .await?
                .iter()
                .map(|u| u.user_name().to_string())
                .collect(),
        };
        info!(users = usernames.len(), "Listing access keys");

        let mut all_keys = Vec::new();
        for username in &usernames {
            let keys = iam
                .list_access_keys()
                .user_name(username.as_str())
                .send()
                .await
                .map_err(AwsError::from_sdk)?;

            for key in keys.access_key_metadata() {
                let key_id = key.access_key_id().unwrap_or_default();
                let last_used_out = iam
                    .get_access_key_last_used()
                    .access_key_id(key_id)
                    .send()
                    .await
                    .map_err(AwsError::from_sdk)?;
                let last_used = last_used_out.access_key_last_used();

                all_keys.push(json!({
                    "username": username,
                    "access_key_id": key_id,
                    "status": key.status().map(|s| s.as_str()).unwrap_or("Unknown"),
                    "created": key
                        .create_date()
                        .map(format::iso8601)
                        .unwrap_or_else(|| "Unknown".to_string()),
                    "age_days": key.create_date().map(|d| format::age_days(d, now)),
                    "last_used": last_used
                        .and_then(|l| l.last_used_date())
                        .map(format::iso8601)
                        .unwrap_or_else(|| "Never".to_string()),
                    "last_used_service": last_used
                        .map(|l| l.service_name())
                        .unwrap_or("N/A"),
                }));
            }
        }

        Ok(json!({ "key_count": all_keys.len(), "access_keys": all_keys }))
    }
}
