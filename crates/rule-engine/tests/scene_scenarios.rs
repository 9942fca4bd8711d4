// Scene lifecycle scenarios: set detection, unset detection, persistence.

mod common;

use std::sync::Arc;

use common::FakeHub;
use hub_client::AttributeValue;
use rule_engine::model::{CompareOperator, ConditionModel, DeviceConditionModel, Scene, SceneSetting};
use rule_engine::{HubInterface, RuleProcessManager, SceneManager};

fn check(device_id: u32, attribute: &str, value: AttributeValue) -> ConditionModel {
	ConditionModel::DeviceCondition(DeviceConditionModel {
		device_id,
		attribute: attribute.to_string(),
		operator: CompareOperator::Eq,
		value,
		duration: None,
	})
}

fn evening_scene() -> Scene {
	Scene {
		name: "evening".to_string(),
		description: Some("Porch light on, lamp dimmed".to_string()),
		settings: vec![
			SceneSetting {
				device_id: 1,
				command: "on".to_string(),
				arguments: None,
				check: check(1, "switch", AttributeValue::from("on")),
			},
			SceneSetting {
				device_id: 2,
				command: "setLevel".to_string(),
				arguments: Some(vec![AttributeValue::Int(50)]),
				check: check(2, "level", AttributeValue::Int(50)),
			},
		],
	}
}

struct Harness {
	hub: Arc<FakeHub>,
	process: Arc<RuleProcessManager>,
	scenes: Arc<SceneManager>,
	_dir: tempfile::TempDir,
}

impl Harness {
	async fn new() -> Self {
		let dir = tempfile::tempdir().unwrap();
		let hub = FakeHub::new();
		let hub_dyn: Arc<dyn HubInterface> = hub.clone();
		let process = RuleProcessManager::new(hub_dyn.clone());
		let scenes = SceneManager::new(hub_dyn, process.clone(), dir.path().join("scenes.json"));
		Self {
			hub,
			process,
			scenes,
			_dir: dir,
		}
	}
}

// Scenario: the scene is already satisfied when created, flips to watching
// for unset, and flips back when a device drifts away.
#[tokio::test]
async fn test_scene_round_trip() {
	let h = Harness::new().await;
	h.hub.set_attribute(1, "switch", AttributeValue::from("on")).await;
	h.hub.set_attribute(2, "level", AttributeValue::Int(50)).await;

	h.scenes.create_scene(evening_scene()).await.unwrap();
	let (_, is_set) = h.scenes.get_scene("evening").await.unwrap();
	assert!(is_set, "matching device state must be detected at creation");

	// Externally flip a device out of the scene.
	h.hub.fire_event(1, "switch", AttributeValue::from("off")).await;
	let (_, is_set) = h.scenes.get_scene("evening").await.unwrap();
	assert!(!is_set);

	// And back in again.
	h.hub.fire_event(1, "switch", AttributeValue::from("on")).await;
	let (_, is_set) = h.scenes.get_scene("evening").await.unwrap();
	assert!(is_set);
}

#[tokio::test]
async fn test_scene_starts_unset_and_detects_set() {
	let h = Harness::new().await;
	h.hub.set_attribute(1, "switch", AttributeValue::from("off")).await;
	h.hub.set_attribute(2, "level", AttributeValue::Int(0)).await;

	h.scenes.create_scene(evening_scene()).await.unwrap();
	let (_, is_set) = h.scenes.get_scene("evening").await.unwrap();
	assert!(!is_set);

	// set_scene sends the commands but does not mark anything by itself.
	h.scenes.set_scene("evening").await.unwrap();
	assert_eq!(
		h.hub.sent_commands().await,
		vec![(1, "on".to_string(), vec![]), (2, "setLevel".to_string(), vec![AttributeValue::Int(50)])]
	);
	let (_, is_set) = h.scenes.get_scene("evening").await.unwrap();
	assert!(!is_set, "set_scene alone must not mark the scene set");

	// The resulting device events do.
	h.hub.fire_event(1, "switch", AttributeValue::from("on")).await;
	let (_, is_set) = h.scenes.get_scene("evening").await.unwrap();
	assert!(!is_set, "one of two settings is not enough");
	h.hub.fire_event(2, "level", AttributeValue::Int(50)).await;
	let (_, is_set) = h.scenes.get_scene("evening").await.unwrap();
	assert!(is_set);
}

#[tokio::test]
async fn test_duplicate_scene_rejected() {
	let h = Harness::new().await;
	h.hub.set_attribute(1, "switch", AttributeValue::from("off")).await;
	h.hub.set_attribute(2, "level", AttributeValue::Int(0)).await;

	h.scenes.create_scene(evening_scene()).await.unwrap();
	let err = h.scenes.create_scene(evening_scene()).await.unwrap_err();
	assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn test_delete_scene_releases_everything() {
	let h = Harness::new().await;
	h.hub.set_attribute(1, "switch", AttributeValue::from("on")).await;
	h.hub.set_attribute(2, "level", AttributeValue::Int(50)).await;

	// Created satisfied, so the unset trigger is the live one.
	h.scenes.create_scene(evening_scene()).await.unwrap();
	h.scenes.delete_scene("evening").await.unwrap();

	assert_eq!(h.process.condition_count().await, 0);
	assert_eq!(h.process.tracked_attribute_count().await, 0);
	assert_eq!(h.hub.subscription_count().await, 0);
	assert!(h.scenes.get_scene("evening").await.is_none());
	assert!(h.scenes.delete_scene("evening").await.is_err());
}

// Scenario: scenes persist and their set state is redetected from live
// device attributes after a restart.
#[tokio::test]
async fn test_scene_persistence_across_restart() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("scenes.json");

	{
		let hub = FakeHub::new();
		hub.set_attribute(1, "switch", AttributeValue::from("off")).await;
		hub.set_attribute(2, "level", AttributeValue::Int(0)).await;
		let hub_dyn: Arc<dyn HubInterface> = hub.clone();
		let process = RuleProcessManager::new(hub_dyn.clone());
		let scenes = SceneManager::new(hub_dyn, process, path.clone());
		scenes.create_scene(evening_scene()).await.unwrap();
		let (_, is_set) = scenes.get_scene("evening").await.unwrap();
		assert!(!is_set);
	}

	// Restart with the devices now matching the scene.
	let hub = FakeHub::new();
	hub.set_attribute(1, "switch", AttributeValue::from("on")).await;
	hub.set_attribute(2, "level", AttributeValue::Int(50)).await;
	let hub_dyn: Arc<dyn HubInterface> = hub.clone();
	let process = RuleProcessManager::new(hub_dyn.clone());
	let scenes = SceneManager::new(hub_dyn, process, path);
	scenes.install_saved_scenes().await.unwrap();

	let all = scenes.get_all_scenes().await;
	assert_eq!(all.len(), 1);
	assert_eq!(all[0].0.name, "evening");
	assert!(all[0].1, "set state is redetected from live attributes");
}
