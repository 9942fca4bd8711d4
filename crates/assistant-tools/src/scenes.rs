use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use rule_engine::model::Scene;
use rule_engine::SceneManager;

use crate::{AssistantTool, ToolError};

#[derive(Deserialize)]
struct SceneName {
	name: String,
}

#[derive(Deserialize, Default)]
struct ListScenesArgs {
	/// Optional filter: "set" or "unset".
	#[serde(default)]
	filter: Option<String>,
}

pub struct CreateSceneTool {
	scenes: Arc<SceneManager>,
}

impl CreateSceneTool {
	pub fn new(scenes: Arc<SceneManager>) -> Self {
		Self { scenes }
	}
}

#[async_trait]
impl AssistantTool for CreateSceneTool {
	fn name(&self) -> &'static str {
		"create_scene"
	}

	fn description(&self) -> &'static str {
		"Use this function to create a new scene"
	}

	async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
		let scene: Scene = serde_json::from_value(arguments)?;
		info!(scene = %scene.name, "assistant creating scene");
		self.scenes.create_scene(scene).await?;
		Ok(json!("Scene created successfully"))
	}
}

pub struct DeleteSceneTool {
	scenes: Arc<SceneManager>,
}

impl DeleteSceneTool {
	pub fn new(scenes: Arc<SceneManager>) -> Self {
		Self { scenes }
	}
}

#[async_trait]
impl AssistantTool for DeleteSceneTool {
	fn name(&self) -> &'static str {
		"delete_scene"
	}

	fn description(&self) -> &'static str {
		"Use this function to delete a scene by name"
	}

	async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
		let args: SceneName = serde_json::from_value(arguments)?;
		self.scenes.delete_scene(&args.name).await?;
		Ok(json!("Scene deleted successfully"))
	}
}

pub struct ListScenesTool {
	scenes: Arc<SceneManager>,
}

impl ListScenesTool {
	pub fn new(scenes: Arc<SceneManager>) -> Self {
		Self { scenes }
	}
}

#[async_trait]
impl AssistantTool for ListScenesTool {
	fn name(&self) -> &'static str {
		"list_scenes"
	}

	fn description(&self) -> &'static str {
		"Use this function to list all scenes, optionally only those currently set or unset"
	}

	async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
		let args: ListScenesArgs = if arguments.is_null() { ListScenesArgs::default() } else { serde_json::from_value(arguments)? };
		let wanted = match args.filter.as_deref() {
			Some("set") => Some(true),
			Some("unset") => Some(false),
			_ => None,
		};

		let mut listing = Vec::new();
		for (scene, is_set) in self.scenes.get_all_scenes().await {
			if wanted.is_some_and(|w| w != is_set) {
				continue;
			}
			let mut entry = serde_json::to_value(scene)?;
			if let Some(map) = entry.as_object_mut() {
				map.insert("is_set".to_string(), json!(is_set));
			}
			listing.push(entry);
		}
		Ok(Value::Array(listing))
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::sync::Arc;

	use async_trait::async_trait;
	use hub_client::{AttributeValue, DeviceId, EventCallback, HubError};
	use rule_engine::{HubInterface, RuleManager, RuleProcessManager, SceneManager};
	use serde_json::json;
	use tokio::sync::Mutex;

	use crate::{toolset, AssistantTool};

	#[derive(Default)]
	struct StubHub {
		attributes: Mutex<HashMap<(DeviceId, String), AttributeValue>>,
	}

	#[async_trait]
	impl HubInterface for StubHub {
		async fn send_command(&self, _device_id: DeviceId, _command: &str, _arguments: Option<&[AttributeValue]>) -> Result<(), HubError> {
			Ok(())
		}

		async fn get_attribute(&self, device_id: DeviceId, attribute: &str) -> Result<AttributeValue, HubError> {
			Ok(self.attributes.lock().await.get(&(device_id, attribute.to_string())).cloned().unwrap_or(AttributeValue::Null))
		}

		async fn subscribe(&self, _device_id: DeviceId, _attributes: Vec<String>, _callback: EventCallback) {}

		async fn unsubscribe(&self, _device_id: DeviceId) {}
	}

	async fn tools() -> (Vec<Arc<dyn AssistantTool>>, tempfile::TempDir) {
		let dir = tempfile::tempdir().unwrap();
		let hub: Arc<dyn HubInterface> = Arc::new(StubHub::default());
		let process = RuleProcessManager::new(hub.clone());
		let scenes = SceneManager::new(hub.clone(), process.clone(), dir.path().join("scenes.json"));
		let rules = RuleManager::new(process, hub, scenes.clone(), dir.path().join("rules.json"));
		(toolset(rules, scenes), dir)
	}

	fn tool<'a>(tools: &'a [Arc<dyn AssistantTool>], name: &str) -> &'a Arc<dyn AssistantTool> {
		tools.iter().find(|t| t.name() == name).unwrap()
	}

	fn sample_rule(name: &str) -> serde_json::Value {
		json!({
			"name": name,
			"description": "turn on the porch light at dusk",
			"trigger": {"kind": "device_condition", "device_id": 1, "attribute": "switch", "operator": "=", "value": "on"},
			"actions": [{"kind": "device_control", "device_id": 2, "command": "on"}]
		})
	}

	#[tokio::test]
	async fn test_rule_tools_roundtrip() {
		let (tools, _dir) = tools().await;

		tool(&tools, "install_rule").invoke(sample_rule("porch")).await.unwrap();

		let listing = tool(&tools, "list_rules").invoke(json!({})).await.unwrap();
		assert_eq!(listing, json!([{"name": "porch", "description": "turn on the porch light at dusk"}]));

		let described = tool(&tools, "describe_rule").invoke(json!({"name": "porch"})).await.unwrap();
		assert_eq!(described["trigger"]["kind"], "device_condition");

		tool(&tools, "uninstall_rule").invoke(json!({"name": "porch"})).await.unwrap();
		let listing = tool(&tools, "list_rules").invoke(json!({})).await.unwrap();
		assert_eq!(listing, json!([]));
	}

	#[tokio::test]
	async fn test_install_rule_surfaces_duplicates() {
		let (tools, _dir) = tools().await;
		tool(&tools, "install_rule").invoke(sample_rule("twice")).await.unwrap();
		assert!(tool(&tools, "install_rule").invoke(sample_rule("twice")).await.is_err());
	}

	#[tokio::test]
	async fn test_install_rule_rejects_malformed_arguments() {
		let (tools, _dir) = tools().await;
		let result = tool(&tools, "install_rule").invoke(json!({"name": "broken"})).await;
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn test_scene_tools_roundtrip_with_filter() {
		let (tools, _dir) = tools().await;

		let scene = json!({
			"name": "cozy",
			"settings": [{
				"device_id": 2,
				"command": "setLevel",
				"arguments": [30],
				"check": {"kind": "device_condition", "device_id": 2, "attribute": "level", "operator": "=", "value": 30}
			}]
		});
		tool(&tools, "create_scene").invoke(scene).await.unwrap();

		let all = tool(&tools, "list_scenes").invoke(json!({})).await.unwrap();
		assert_eq!(all.as_array().unwrap().len(), 1);
		assert_eq!(all[0]["is_set"], json!(false));

		let set_only = tool(&tools, "list_scenes").invoke(json!({"filter": "set"})).await.unwrap();
		assert_eq!(set_only, json!([]));
		let unset_only = tool(&tools, "list_scenes").invoke(json!({"filter": "unset"})).await.unwrap();
		assert_eq!(unset_only.as_array().unwrap().len(), 1);

		tool(&tools, "delete_scene").invoke(json!({"name": "cozy"})).await.unwrap();
		let all = tool(&tools, "list_scenes").invoke(json!(null)).await.unwrap();
		assert_eq!(all, json!([]));
	}

	#[tokio::test]
	async fn test_execute_actions_tool() {
		let (tools, _dir) = tools().await;
		let result = tool(&tools, "execute_actions")
			.invoke(json!({"actions": [{"kind": "device_control", "device_id": 2, "command": "off"}]}))
			.await
			.unwrap();
		assert_eq!(result, json!("Success"));
	}
}
