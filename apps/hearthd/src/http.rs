use std::collections::HashMap;
use std::sync::Arc;

use assistant_tools::{AssistantTool, ToolError};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use hub_client::HubClient;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct ApiContext {
	pub hub: Arc<HubClient>,
	pub tools: Arc<HashMap<&'static str, Arc<dyn AssistantTool>>>,
}

pub fn router(context: ApiContext) -> Router {
	Router::new()
		.route("/healthz", get(healthz))
		.route("/he_event", post(hub_event))
		.route("/tools/:name", post(invoke_tool))
		// Enables logging. Use `RUST_LOG=tower_http=debug`
		.layer(TraceLayer::new_for_http())
		.with_state(context)
}

async fn healthz() -> &'static str {
	"ok"
}

/// Ingress for raw device events posted by the hub.
async fn hub_event(State(context): State<ApiContext>, Json(payload): Json<Value>) -> (StatusCode, Json<Value>) {
	let Some(content) = payload.get("content") else {
		return (StatusCode::BAD_REQUEST, Json(json!({"error": "missing 'content'"})));
	};
	match context.hub.handle_device_event(content).await {
		Ok(_) => (StatusCode::OK, Json(json!("Success"))),
		Err(err) => {
			warn!(error = %err, "rejected hub event");
			(StatusCode::BAD_REQUEST, Json(json!({"error": err.to_string()})))
		}
	}
}

/// Attachment point for the assistant harness: invoke a tool by name.
async fn invoke_tool(State(context): State<ApiContext>, Path(name): Path<String>, Json(arguments): Json<Value>) -> (StatusCode, Json<Value>) {
	let Some(tool) = context.tools.get(name.as_str()) else {
		return (StatusCode::NOT_FOUND, Json(json!({"error": format!("no tool named '{name}'")})));
	};
	match tool.invoke(arguments).await {
		Ok(result) => (StatusCode::OK, Json(result)),
		Err(err @ ToolError::BadArguments(_)) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": err.to_string()}))),
		Err(err) => (StatusCode::BAD_REQUEST, Json(json!({"error": err.to_string()}))),
	}
}
