use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use cloudpilot_tools::error_envelope;
use cloudpilot_tools::registry::ToolRegistry;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    tools: ToolRegistry,
    auth_token: Option<String>,
}

/// HTTP invocation boundary: lists tool definitions and dispatches named
/// calls with JSON arguments. Tool failures are data, not transport
/// failures — they come back as HTTP 200 error envelopes.
pub struct Gateway {
    tools: ToolRegistry,
    port: u16,
    auth_token: Option<String>,
}

impl Gateway {
    pub fn new(tools: ToolRegistry, port: u16, auth_token: Option<String>) -> Self {
        Self {
            tools,
            port,
            auth_token,
        }
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let state = AppState {
            tools: self.tools.clone(),
            auth_token: self.auth_token.clone(),
        };

        let app = Router::new()
            .route("/health", get(health_check))
            .route("/api/tools", get(list_tools))
            .route("/api/tools/:name", post(invoke_tool))
            .route("/api/monitor/metrics", get(get_metrics))
            .with_state(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Gateway listening on {}", addr);
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

fn authorized(auth_token: &Option<String>, headers: &HeaderMap) -> bool {
    match auth_token {
        None => true,
        Some(expected) => headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {expected}"))
            .unwrap_or(false),
    }
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_tools(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&state.auth_token, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        );
    }
    let definitions = state.tools.list_definitions().await;
    (StatusCode::OK, Json(json!({ "tools": definitions })))
}

async fn get_metrics(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&state.auth_token, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        );
    }
    let metrics = state.tools.get_metrics().await;
    let shaped: Map<String, Value> = metrics
        .into_iter()
        .map(|(name, m)| {
            (
                name,
                json!({
                    "execution_count": m.execution_count,
                    "success_count": m.success_count,
                    "failure_count": m.failure_count,
                    "total_duration_ms": m.total_duration_ms,
                }),
            )
        })
        .collect();
    (StatusCode::OK, Json(json!({ "tools": shaped })))
}

async fn invoke_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(args): Json<Value>,
) -> impl IntoResponse {
    if !authorized(&state.auth_token, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        );
    }

    let tool = match state.tools.get(&name).await {
        Some(tool) => tool,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("Unknown tool '{name}'") })),
            );
        }
    };

    let invocation_id = Uuid::new_v4();
    let started = Instant::now();
    let result = tool.execute(args).await;
    let duration_ms = started.elapsed().as_millis() as u64;
    state
        .tools
        .record_metrics(&name, duration_ms, result.is_ok())
        .await;

    let envelope = match result {
        Ok(value) => {
            info!(%invocation_id, tool = %name, duration_ms, "Tool invocation succeeded");
            value
        }
        Err(err) => {
            warn!(%invocation_id, tool = %name, duration_ms, error = %err, "Tool invocation failed");
            error_envelope(&err)
        }
    };

    (StatusCode::OK, Json(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_gateway_accepts_any_request() {
        assert!(authorized(&None, &HeaderMap::new()));
    }

    #[test]
    fn bearer_token_must_match() {
        let token = Some("sekrit".to_string());

        let mut good = HeaderMap::new();
        good.insert("authorization", "Bearer sekrit".parse().unwrap());
        assert!(authorized(&token, &good));

        let mut bad = HeaderMap::new();
        bad.insert("authorization", "Bearer wrong".parse().unwrap());
        assert!(!authorized(&token, &bad));

        assert!(!authorized(&token, &HeaderMap::new()));
    }
}
