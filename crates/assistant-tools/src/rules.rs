use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use rule_engine::model::{ActionModel, Rule};
use rule_engine::RuleManager;

use crate::{AssistantTool, ToolError};

#[derive(Deserialize)]
struct RuleName {
	name: String,
}

#[derive(Deserialize)]
struct ActionList {
	actions: Vec<ActionModel>,
}

pub struct InstallRuleTool {
	rules: Arc<RuleManager>,
}

impl InstallRuleTool {
	pub fn new(rules: Arc<RuleManager>) -> Self {
		Self { rules }
	}
}

#[async_trait]
impl AssistantTool for InstallRuleTool {
	fn name(&self) -> &'static str {
		"install_rule"
	}

	fn description(&self) -> &'static str {
		"Use this function to install an automation rule"
	}

	async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
		let rule: Rule = serde_json::from_value(arguments)?;
		info!(rule = %rule.name, "assistant installing rule");
		self.rules.install_rule(rule).await?;
		Ok(json!("Rule installed successfully"))
	}
}

pub struct UninstallRuleTool {
	rules: Arc<RuleManager>,
}

impl UninstallRuleTool {
	pub fn new(rules: Arc<RuleManager>) -> Self {
		Self { rules }
	}
}

#[async_trait]
impl AssistantTool for UninstallRuleTool {
	fn name(&self) -> &'static str {
		"uninstall_rule"
	}

	fn description(&self) -> &'static str {
		"Use this function to uninstall an automation rule by name"
	}

	async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
		let args: RuleName = serde_json::from_value(arguments)?;
		self.rules.uninstall_rule(&args.name).await?;
		Ok(json!("Rule uninstalled successfully"))
	}
}

pub struct DescribeRuleTool {
	rules: Arc<RuleManager>,
}

impl DescribeRuleTool {
	pub fn new(rules: Arc<RuleManager>) -> Self {
		Self { rules }
	}
}

#[async_trait]
impl AssistantTool for DescribeRuleTool {
	fn name(&self) -> &'static str {
		"describe_rule"
	}

	fn description(&self) -> &'static str {
		"Use this function to get the full definition of an installed rule"
	}

	async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
		let args: RuleName = serde_json::from_value(arguments)?;
		match self.rules.get_rule_by_name(&args.name).await {
			Some(rule) => Ok(serde_json::to_value(rule)?),
			None => Ok(json!(format!("No rule named '{}' is installed", args.name))),
		}
	}
}

pub struct ListRulesTool {
	rules: Arc<RuleManager>,
}

impl ListRulesTool {
	pub fn new(rules: Arc<RuleManager>) -> Self {
		Self { rules }
	}
}

#[async_trait]
impl AssistantTool for ListRulesTool {
	fn name(&self) -> &'static str {
		"list_rules"
	}

	fn description(&self) -> &'static str {
		"Use this function to list the names and descriptions of all installed rules"
	}

	async fn invoke(&self, _arguments: Value) -> Result<Value, ToolError> {
		let rules = self.rules.get_installed_rules().await;
		let listing: Vec<Value> = rules.iter().map(|r| json!({"name": r.name, "description": r.description})).collect();
		Ok(Value::Array(listing))
	}
}

pub struct ExecuteActionsTool {
	rules: Arc<RuleManager>,
}

impl ExecuteActionsTool {
	pub fn new(rules: Arc<RuleManager>) -> Self {
		Self { rules }
	}
}

#[async_trait]
impl AssistantTool for ExecuteActionsTool {
	fn name(&self) -> &'static str {
		"execute_actions"
	}

	fn description(&self) -> &'static str {
		"Use this function to execute a one-off sequence of actions right now"
	}

	async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
		let args: ActionList = serde_json::from_value(arguments)?;
		self.rules.run_actions(args.actions).await?;
		Ok(json!("Success"))
	}
}
