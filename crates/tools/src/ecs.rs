use crate::{parse_args, Tool, ToolError};
use async_trait::async_trait;
use aws_sdk_ecs::types::{Cluster, ContainerDefinition, DesiredStatus, Service, Task};
use aws_sdk_health::types::{EntityFilter, EventFilter, EventStatusCode, EventTypeCategory};
use aws_smithy_types::DateTime as SmithyDateTime;
use chrono::{DateTime, Duration, Utc};
use cloudpilot_aws::format;
use cloudpilot_aws::{collect_pages, describe_in_batches, AwsClients, AwsError, Page};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// DescribeServices accepts at most 10 services per call.
const SERVICE_BATCH: usize = 10;
/// DescribeTasks accepts at most 100 tasks per call.
const TASK_BATCH: usize = 100;

fn shape_cluster(cluster: &Cluster) -> Value {
    json!({
        "name": cluster.cluster_name().unwrap_or_default(),
        "status": cluster.status().unwrap_or_default(),
        "running_tasks": cluster.running_tasks_count(),
        "pending_tasks": cluster.pending_tasks_count(),
        "active_services": cluster.active_services_count(),
        "registered_instances": cluster.registered_container_instances_count(),
    })
}

fn shape_service(service: &Service) -> Value {
    json!({
        "name": service.service_name().unwrap_or_default(),
        "status": service.status().unwrap_or_default(),
        "desired_count": service.desired_count(),
        "running_count": service.running_count(),
        "pending_count": service.pending_count(),
        "launch_type": service.launch_type().map(|l| l.as_str()).unwrap_or("EC2"),
        "task_definition": format::arn_tail(service.task_definition().unwrap_or_default()),
    })
}

fn shape_task(task: &Task) -> Value {
    json!({
        "task_id": format::arn_tail(task.task_arn().unwrap_or_default()),
        "task_definition": format::arn_tail(task.task_definition_arn().unwrap_or_default()),
        "status": task.last_status().unwrap_or_default(),
        "health_status": task.health_status().map(|h| h.as_str()).unwrap_or("UNKNOWN"),
        "launch_type": task.launch_type().map(|l| l.as_str()).unwrap_or("EC2"),
        "cpu": task.cpu().unwrap_or("N/A"),
        "memory": task.memory().unwrap_or("N/A"),
        "started_at": task
            .started_at()
            .map(format::iso8601)
            .unwrap_or_else(|| "Not started".to_string()),
    })
}

fn shape_container(container: &ContainerDefinition) -> Value {
    let or_na = |v: Option<i32>| v.map(Value::from).unwrap_or_else(|| Value::from("N/A"));
    json!({
        "name": container.name().unwrap_or_default(),
        "image": container.image().unwrap_or_default(),
        "cpu": container.cpu(),
        "memory": or_na(container.memory()),
        "memory_reservation": or_na(container.memory_reservation()),
        "essential": container.essential().unwrap_or(true),
        "port_mappings": container
            .port_mappings()
            .iter()
            .map(|pm| {
                json!({
                    "container_port": pm.container_port(),
                    "host_port": pm.host_port(),
                    "protocol": pm.protocol().map(|p| p.as_str()),
                })
            })
            .collect::<Vec<_>>(),
    })
}

/// An event belongs to the maintenance window when it has a start time at or
/// before the window's end.
fn within_window(start: Option<&SmithyDateTime>, window_end: DateTime<Utc>) -> bool {
    match start.and_then(format::to_chrono) {
        Some(start) => start <= window_end,
        None => false,
    }
}

/// Task ARNs look like arn:aws:ecs:region:account:task/cluster-name/task-id.
fn cluster_from_task_arn(arn: &str) -> &str {
    arn.split('/').nth(1).unwrap_or("unknown")
}

fn title_case(code: &str) -> String {
    code.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub struct ListEcsClustersTool {
    clients: Arc<AwsClients>,
}

impl ListEcsClustersTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for ListEcsClustersTool {
    fn name(&self) -> &str {
        "list_ecs_clusters"
    }

    fn description(&self) -> &str {
        "List all ECS clusters in the AWS account with task and service counts."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        let ecs = self.clients.ecs().clone();

        let cluster_arns = collect_pages(|token| {
            let ecs = ecs.clone();
            async move {
                let out = ecs
                    .list_clusters()
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(AwsError::from_sdk)?;
                Ok(Page {
                    items: out.cluster_arns().to_vec(),
                    next_token: out.next_token().map(str::to_string),
                })
            }
        })
        .await?;

        if cluster_arns.is_empty() {
            return Ok(json!({ "cluster_count": 0, "clusters": [] }));
        }

        let out = ecs
            .describe_clusters()
            .set_clusters(Some(cluster_arns))
            .send()
            .await
            .map_err(AwsError::from_sdk)?;
        let shaped: Vec<Value> = out.clusters().iter().map(shape_cluster).collect();

        Ok(json!({ "cluster_count": shaped.len(), "clusters": shaped }))
    }
}

#[derive(Deserialize)]
struct ClusterArgs {
    cluster_name: String,
}

pub struct ListEcsServicesTool {
    clients: Arc<AwsClients>,
}

impl ListEcsServicesTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for ListEcsServicesTool {
    fn name(&self) -> &str {
        "list_ecs_services"
    }

    fn description(&self) -> &str {
        "List all services in an ECS cluster."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "cluster_name": {
                    "type": "string",
                    "description": "Name of the ECS cluster"
                }
            },
            "required": ["cluster_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ClusterArgs = parse_args(args)?;
        let ecs = self.clients.ecs().clone();
        let cluster = args.cluster_name.clone();

        let service_arns = collect_pages(|token| {
            let ecs = ecs.clone();
            let cluster = cluster.clone();
            async move {
                let out = ecs
                    .list_services()
                    .cluster(cluster)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(AwsError::from_sdk)?;
                Ok(Page {
                    items: out.service_arns().to_vec(),
                    next_token: out.next_token().map(str::to_string),
                })
            }
        })
        .await?;

        if service_arns.is_empty() {
            return Ok(json!({
                "cluster": args.cluster_name,
                "service_count": 0,
                "services": [],
            }));
        }

        let services = describe_in_batches(&service_arns, SERVICE_BATCH, |batch| {
            let ecs = ecs.clone();
            let cluster = args.cluster_name.clone();
            async move {
                let out = ecs
                    .describe_services()
                    .cluster(cluster)
                    .set_services(Some(batch))
                    .send()
                    .await
                    .map_err(AwsError::from_sdk)?;
                Ok(out.services().to_vec())
            }
        })
        .await?;

        let shaped: Vec<Value> = services.iter().map(shape_service).collect();
        Ok(json!({
            "cluster": args.cluster_name,
            "service_count": shaped.len(),
            "services": shaped,
        }))
    }
}

#[derive(Deserialize)]
struct ServiceStatusArgs {
    cluster_name: String,
    service_name: String,
}

pub struct EcsServiceStatusTool {
    clients: Arc<AwsClients>,
}

impl EcsServiceStatusTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for EcsServiceStatusTool {
    fn name(&self) -> &str {
        "get_ecs_service_status"
    }

    fn description(&self) -> &str {
        "Get detailed status of a specific ECS service including recent deployments."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "cluster_name": {
                    "type": "string",
                    "description": "Name of the ECS cluster"
                },
                "service_name": {
                    "type": "string",
                    "description": "Name of the service"
                }
            },
            "required": ["cluster_name", "service_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ServiceStatusArgs = parse_args(args)?;
        let out = self
            .clients
            .ecs()
            .describe_services()
            .cluster(args.cluster_name.as_str())
            .services(args.service_name.as_str())
            .send()
            .await
            .map_err(AwsError::from_sdk)?;

        let service = out.services().first().ok_or_else(|| {
            ToolError::NotFound(format!(
                "Service '{}' not found in cluster '{}'",
                args.service_name, args.cluster_name
            ))
        })?;

        let deployments: Vec<Value> = service
            .deployments()
            .iter()
            .map(|dep| {
                json!({
                    "id": dep.id().unwrap_or_default(),
                    "status": dep.status().unwrap_or_default(),
                    "desired_count": dep.desired_count(),
                    "running_count": dep.running_count(),
                    "pending_count": dep.pending_count(),
                    "created": dep
                        .created_at()
                        .map(format::iso8601)
                        .unwrap_or_else(|| "Unknown".to_string()),
                    "task_definition": format::arn_tail(dep.task_definition().unwrap_or_default()),
                })
            })
            .collect();

        let events: Vec<Value> = service
            .events()
            .iter()
            .take(5)
            .map(|event| {
                json!({
                    "timestamp": event
                        .created_at()
                        .map(format::iso8601)
                        .unwrap_or_else(|| "Unknown".to_string()),
                    "message": event.message().unwrap_or_default(),
                })
            })
            .collect();

        Ok(json!({
            "cluster": args.cluster_name,
            "service_name": service.service_name().unwrap_or_default(),
            "status": service.status().unwrap_or_default(),
            "desired_count": service.desired_count(),
            "running_count": service.running_count(),
            "pending_count": service.pending_count(),
            "launch_type": service.launch_type().map(|l| l.as_str()).unwrap_or("EC2"),
            "task_definition": format::arn_tail(service.task_definition().unwrap_or_default()),
            "deployments": deployments,
            "recent_events": events,
        }))
    }
}

#[derive(Deserialize)]
struct ListTasksArgs {
    cluster_name: String,
    #[serde(default)]
    service_name: Option<String>,
}

pub struct ListEcsTasksTool {
    clients: Arc<AwsClients>,
}

impl ListEcsTasksTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for ListEcsTasksTool {
    fn name(&self) -> &str {
        "list_ecs_tasks"
    }

    fn description(&self) -> &str {
        "List running tasks in a cluster, optionally filtered by service."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "cluster_name": {
                    "type": "string",
                    "description": "Name of the ECS cluster"
                },
                "service_name": {
                    "type": "string",
                    "description": "Filter by service name (optional)"
                }
            },
            "required": ["cluster_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ListTasksArgs = parse_args(args)?;
        let ecs = self.clients.ecs().clone();
        let cluster = args.cluster_name.clone();
        let service_filter = args.service_name.clone();

        let task_arns = collect_pages(|token| {
            let ecs = ecs.clone();
            let cluster = cluster.clone();
            let service_filter = service_filter.clone();
            async move {
                let out = ecs
                    .list_tasks()
                    .cluster(cluster)
                    .desired_status(DesiredStatus::Running)
                    .set_service_name(service_filter)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(AwsError::from_sdk)?;
                Ok(Page {
                    items: out.task_arns().to_vec(),
                    next_token: out.next_token().map(str::to_string),
                })
            }
        })
        .await?;

        if task_arns.is_empty() {
            return Ok(json!({
                "cluster": args.cluster_name,
                "task_count": 0,
                "tasks": [],
            }));
        }

        let tasks = describe_in_batches(&task_arns, TASK_BATCH, |batch| {
            let ecs = ecs.clone();
            let cluster = args.cluster_name.clone();
            async move {
                let out = ecs
                    .describe_tasks()
                    .cluster(cluster)
                    .set_tasks(Some(batch))
                    .send()
                    .await
                    .map_err(AwsError::from_sdk)?;
                Ok(out.tasks().to_vec())
            }
        })
        .await?;

        let shaped: Vec<Value> = tasks.iter().map(shape_task).collect();
        Ok(json!({
            "cluster": args.cluster_name,
            "task_count": shaped.len(),
            "tasks": shaped,
        }))
    }
}

#[derive(Deserialize)]
struct TaskDefinitionArgs {
    task_definition: String,
}

pub struct DescribeTaskDefinitionTool {
    clients: Arc<AwsClients>,
}

impl DescribeTaskDefinitionTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for DescribeTaskDefinitionTool {
    fn name(&self) -> &str {
        "describe_task_definition"
    }

    fn description(&self) -> &str {
        "Get details of an ECS task definition including container images, CPU, and memory."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_definition": {
                    "type": "string",
                    "description": "Task definition name or ARN (e.g. \"my-task:1\", or \"my-task\" for latest)"
                }
            },
            "required": ["task_definition"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: TaskDefinitionArgs = parse_args(args)?;
        let out = self
            .clients
            .ecs()
            .describe_task_definition()
            .task_definition(args.task_definition.as_str())
            .send()
            .await
            .map_err(AwsError::from_sdk)?;

        let task_def = out.task_definition().ok_or_else(|| {
            ToolError::NotFound(format!(
                "Task definition '{}' not found",
                args.task_definition
            ))
        })?;

        let containers: Vec<Value> = task_def
            .container_definitions()
            .iter()
            .map(shape_container)
            .collect();

        Ok(json!({
            "family": task_def.family().unwrap_or_default(),
            "revision": task_def.revision(),
            "status": task_def.status().map(|s| s.as_str()).unwrap_or_default(),
            "task_role": format::arn_tail(task_def.task_role_arn().unwrap_or("None")),
            "execution_role": format::arn_tail(task_def.execution_role_arn().unwrap_or("None")),
            "network_mode": task_def.network_mode().map(|m| m.as_str()).unwrap_or("bridge"),
            "cpu": task_def.cpu().unwrap_or("N/A"),
            "memory": task_def.memory().unwrap_or("N/A"),
            "containers": containers,
        }))
    }
}

#[derive(Deserialize)]
struct RetirementArgs {
    #[serde(default = "default_lookahead_days")]
    days: i64,
}

fn default_lookahead_days() -> i64 {
    14
}

pub struct FargateRetirementsTool {
    clients: Arc<AwsClients>,
}

impl FargateRetirementsTool {
    pub fn new(clients: Arc<AwsClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Tool for FargateRetirementsTool {
    fn name(&self) -> &str {
        "list_fargate_retirements"
    }

    fn description(&self) -> &str {
        "Find Fargate tasks scheduled for retirement due to AWS maintenance. Requires a Business or Enterprise support plan for Health API access."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "days": {
                    "type": "integer",
                    "description": "Number of days to look ahead (default: 14)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: RetirementArgs = parse_args(args)?;
        let health = self.clients.health().clone();
        let window_end = Utc::now() + Duration::days(args.days);

        let filter = EventFilter::builder()
            .services("ECS")
            .event_type_categories(EventTypeCategory::ScheduledChange)
            .event_status_codes(EventStatusCode::Open)
            .event_status_codes(EventStatusCode::Upcoming)
            .build();

        let events = match collect_pages(|token| {
            let health = health.clone();
            let filter = filter.clone();
            async move {
                let out = health
                    .describe_events()
                    .filter(filter)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(AwsError::from_sdk)?;
                Ok(Page {
                    items: out.events().to_vec(),
                    next_token: out.next_token().map(str::to_string),
                })
            }
        })
        .await
        {
            Ok(events) => events,
            Err(err) if err.code() == Some("SubscriptionRequiredException") => {
                return Err(ToolError::Entitlement {
                    message: "AWS Health API requires Business or Enterprise support plan"
                        .to_string(),
                    suggestion: "Upgrade your AWS support plan or check the AWS Health Dashboard in the console manually"
                        .to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let upcoming: Vec<_> = events
            .into_iter()
            .filter(|event| within_window(event.start_time(), window_end))
            .collect();

        if upcoming.is_empty() {
            return Ok(json!({
                "days_checked": args.days,
                "retirement_count": 0,
                "message": "No Fargate task retirements scheduled in the specified time window",
                "retirements": [],
            }));
        }

        let mut retirements = Vec::new();
        for event in &upcoming {
            let event_arn = event.arn().unwrap_or_default();
            let entity_filter = EntityFilter::builder()
                .event_arns(event_arn)
                .build()
                .map_err(|e| ToolError::Api(e.to_string()))?;

            // A single opaque event must not sink the whole report.
            let affected = match health
                .describe_affected_entities()
                .filter(entity_filter)
                .send()
                .await
            {
                Ok(affected) => affected,
                Err(err) => {
                    warn!(event = event_arn, error = %AwsError::from_sdk(err), "Skipping event entities");
                    continue;
                }
            };

            let event_type = event.event_type_code().unwrap_or_default();
            for entity in affected.entities() {
                let entity_value = entity.entity_value().unwrap_or_default();
                let fargate = entity_value.contains("/task/")
                    || event_type.to_lowercase().contains("fargate");
                if !fargate {
                    continue;
                }
                retirements.push(json!({
                    "task_arn": entity_value,
                    "event_type": event_type,
                    "status": entity.status_code().map(|s| s.as_str()),
                    "scheduled_start": event.start_time().map(format::iso8601),
                    "scheduled_end": event.end_time().map(format::iso8601),
                    "description": title_case(event_type),
                }));
            }
        }

        let mut by_cluster: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for retirement in &retirements {
            let arn = retirement["task_arn"].as_str().unwrap_or_default();
            by_cluster
                .entry(cluster_from_task_arn(arn).to_string())
                .or_default()
                .push(retirement.clone());
        }
        let grouped: Map<String, Value> = by_cluster
            .into_iter()
            .map(|(cluster, entries)| (cluster, Value::Array(entries)))
            .collect();

        Ok(json!({
            "days_checked": args.days,
            "retirement_count": retirements.len(),
            "retirements_by_cluster": grouped,
            "retirements": retirements,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ecs::types::{Deployment, PortMapping, TransportProtocol};

    #[test]
    fn service_shaping_defaults_launch_type_and_trims_arn() {
        let service = Service::builder()
            .service_name("web")
            .status("ACTIVE")
            .desired_count(3)
            .running_count(3)
            .pending_count(0)
            .task_definition("arn:aws:ecs:us-east-1:123:task-definition/web:7")
            .build();
        let shaped = shape_service(&service);
        assert_eq!(shaped["launch_type"], "EC2");
        assert_eq!(shaped["task_definition"], "web:7");
        assert_eq!(shaped["desired_count"], 3);
    }

    #[test]
    fn task_shaping_substitutes_absent_fields() {
        let task = Task::builder()
            .task_arn("arn:aws:ecs:us-east-1:123:task/prod/abc123")
            .task_definition_arn("arn:aws:ecs:us-east-1:123:task-definition/web:7")
            .last_status("PROVISIONING")
            .build();
        let shaped = shape_task(&task);
        assert_eq!(shaped["task_id"], "abc123");
        assert_eq!(shaped["health_status"], "UNKNOWN");
        assert_eq!(shaped["cpu"], "N/A");
        assert_eq!(shaped["started_at"], "Not started");
    }

    #[test]
    fn container_shaping_keeps_port_mappings() {
        let container = ContainerDefinition::builder()
            .name("app")
            .image("repo/app:1")
            .memory(512)
            .port_mappings(
                PortMapping::builder()
                    .container_port(8080)
                    .host_port(80)
                    .protocol(TransportProtocol::Tcp)
                    .build(),
            )
            .build();
        let shaped = shape_container(&container);
        assert_eq!(shaped["memory"], 512);
        assert_eq!(shaped["memory_reservation"], "N/A");
        assert_eq!(shaped["essential"], true);
        assert_eq!(shaped["port_mappings"][0]["container_port"], 8080);
        assert_eq!(shaped["port_mappings"][0]["protocol"], "tcp");
    }

    #[test]
    fn deployment_fields_survive_shaping() {
        let dep = Deployment::builder()
            .id("ecs-svc/123")
            .status("PRIMARY")
            .desired_count(2)
            .running_count(2)
            .pending_count(0)
            .task_definition("arn:aws:ecs:us-east-1:123:task-definition/web:7")
            .build();
        // Shaped inline by the status tool; exercise the arn helper contract here.
        assert_eq!(format::arn_tail(dep.task_definition().unwrap()), "web:7");
    }

    #[test]
    fn window_filter_keeps_events_starting_inside() {
        let end = DateTime::from_timestamp(1_000_000, 0).unwrap();
        let inside = SmithyDateTime::from_secs(999_999);
        let at_end = SmithyDateTime::from_secs(1_000_000);
        let outside = SmithyDateTime::from_secs(1_000_001);

        assert!(within_window(Some(&inside), end));
        assert!(within_window(Some(&at_end), end));
        assert!(!within_window(Some(&outside), end));
        assert!(!within_window(None, end));
    }

    #[test]
    fn cluster_is_parsed_from_task_arn() {
        assert_eq!(
            cluster_from_task_arn("arn:aws:ecs:us-east-1:123:task/prod/abc"),
            "prod"
        );
        assert_eq!(cluster_from_task_arn("no-slashes"), "unknown");
    }

    #[test]
    fn event_codes_become_readable_descriptions() {
        assert_eq!(
            title_case("AWS_ECS_TASK_PATCHING_RETIREMENT"),
            "Aws Ecs Task Patching Retirement"
        );
    }
}
