//! Assistant-facing tool contracts.
//!
//! Each tool is a named, described, JSON-in/JSON-out shim over the rule and
//! scene managers, thin enough that the assistant harness can expose them
//! directly as callable functions.

pub mod rules;
pub mod scenes;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use rules::{DescribeRuleTool, ExecuteActionsTool, InstallRuleTool, ListRulesTool, UninstallRuleTool};
pub use scenes::{CreateSceneTool, DeleteSceneTool, ListScenesTool};

use std::sync::Arc;

use rule_engine::{EngineError, RuleManager, SceneManager};

#[derive(Error, Debug)]
pub enum ToolError {
	#[error("invalid arguments: {0}")]
	BadArguments(#[from] serde_json::Error),
	#[error(transparent)]
	Engine(#[from] EngineError),
}

/// A callable operation the assistant can invoke.
#[async_trait]
pub trait AssistantTool: Send + Sync {
	fn name(&self) -> &'static str;

	/// One-line description surfaced to the assistant.
	fn description(&self) -> &'static str;

	async fn invoke(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// The standard toolset over a manager pair.
pub fn toolset(rules: Arc<RuleManager>, scenes: Arc<SceneManager>) -> Vec<Arc<dyn AssistantTool>> {
	vec![
		Arc::new(InstallRuleTool::new(rules.clone())),
		Arc::new(UninstallRuleTool::new(rules.clone())),
		Arc::new(DescribeRuleTool::new(rules.clone())),
		Arc::new(ListRulesTool::new(rules.clone())),
		Arc::new(ExecuteActionsTool::new(rules)),
		Arc::new(CreateSceneTool::new(scenes.clone())),
		Arc::new(DeleteSceneTool::new(scenes.clone())),
		Arc::new(ListScenesTool::new(scenes)),
	]
}
