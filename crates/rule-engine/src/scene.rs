//! Scenes: declarative multi-device states tracked reactively.
//!
//! Each scene is represented by two complementary conditions. While the
//! scene is unset, the set trigger (AND of all setting checks) is installed;
//! once it fires, it swaps itself for the unset trigger (its negation), and
//! back again. Setting a scene only sends commands: the resulting device
//! events drive the flip through the normal reactive path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::condition::ConditionNode;
use crate::error::EngineError;
use crate::hub::HubInterface;
use crate::model::{BooleanConditionModel, BooleanOperator, Scene};
use crate::process::{ActionFn, RuleProcessManager};
use crate::store;

struct InternalScene {
	model: Scene,
	set_trigger: Arc<ConditionNode>,
	unset_trigger: Arc<ConditionNode>,
	is_set: AtomicBool,
}

impl InternalScene {
	fn new(model: Scene) -> Result<Arc<Self>, EngineError> {
		let checks = BooleanConditionModel {
			operator: BooleanOperator::And,
			conditions: model.settings.iter().map(|s| s.check.clone()).collect(),
			duration: None,
		};
		let set_trigger = ConditionNode::boolean(&checks, None, None)?;
		let unset_trigger = ConditionNode::combinator(BooleanOperator::Not, vec![set_trigger.clone()], None, None);
		Ok(Arc::new(Self {
			model,
			set_trigger,
			unset_trigger,
			is_set: AtomicBool::new(false),
		}))
	}
}

/// Manager for scenes (multi-device controls).
pub struct SceneManager {
	hub: Arc<dyn HubInterface>,
	process: Arc<RuleProcessManager>,
	scenes: Mutex<HashMap<String, Arc<InternalScene>>>,
	scenes_path: PathBuf,
}

impl SceneManager {
	pub fn new(hub: Arc<dyn HubInterface>, process: Arc<RuleProcessManager>, scenes_path: PathBuf) -> Arc<Self> {
		Arc::new(Self {
			hub,
			process,
			scenes: Mutex::new(HashMap::new()),
			scenes_path,
		})
	}

	/// Load and recreate every scene in the scenes file.
	///
	/// Whether each scene is currently set is redetected from live device
	/// state as its triggers install. Failures are logged and skipped.
	pub async fn install_saved_scenes(&self) -> Result<(), EngineError> {
		let scenes: Vec<Scene> = store::load_models(&self.scenes_path).await?;
		for scene in scenes {
			let name = scene.name.clone();
			if let Err(err) = self.create_scene(scene).await {
				warn!(scene = %name, error = %err, "failed to reinstall saved scene");
			}
		}
		Ok(())
	}

	/// Create a scene and start watching for its set state.
	pub async fn create_scene(&self, scene: Scene) -> Result<(), EngineError> {
		if self.scenes.lock().await.contains_key(&scene.name) {
			return Err(EngineError::DuplicateScene(scene.name));
		}
		let name = scene.name.clone();

		let internal = InternalScene::new(scene)?;
		internal.set_trigger.set_action(Self::on_scene_is_set(&internal)).await;
		internal.unset_trigger.set_action(Self::on_scene_is_unset(&internal)).await;
		// A scene that is already satisfied when created must still make the
		// transition to waiting for unset.
		internal.set_trigger.set_trigger_always(true);

		self.scenes.lock().await.insert(name.clone(), internal.clone());
		self.save_scenes().await?;

		self.process.add_condition(internal.set_trigger.clone()).await?;
		info!(scene = %name, "scene created");
		Ok(())
	}

	/// Delete a scene, removing whichever of its triggers is live.
	pub async fn delete_scene(&self, name: &str) -> Result<(), EngineError> {
		let Some(internal) = self.scenes.lock().await.remove(name) else {
			return Err(EngineError::UnknownScene(name.to_string()));
		};
		// Only one of the two is installed; removing the other is a no-op.
		self.process.remove_condition(&internal.set_trigger).await?;
		self.process.remove_condition(&internal.unset_trigger).await?;
		self.save_scenes().await?;
		info!(scene = %name, "scene deleted");
		Ok(())
	}

	/// Send every setting's command, in order.
	///
	/// This does not mark the scene set; the device events that result drive
	/// the set trigger through the reactive path.
	pub async fn set_scene(&self, name: &str) -> Result<(), EngineError> {
		let Some(internal) = self.scenes.lock().await.get(name).cloned() else {
			return Err(EngineError::UnknownScene(name.to_string()));
		};
		for setting in &internal.model.settings {
			self.hub.send_command(setting.device_id, &setting.command, setting.arguments.as_deref()).await?;
		}
		Ok(())
	}

	pub async fn get_scene(&self, name: &str) -> Option<(Scene, bool)> {
		self.scenes.lock().await.get(name).map(|s| (s.model.clone(), s.is_set.load(Ordering::SeqCst)))
	}

	/// Every scene's model along with its current set flag.
	pub async fn get_all_scenes(&self) -> Vec<(Scene, bool)> {
		self.scenes.lock().await.values().map(|s| (s.model.clone(), s.is_set.load(Ordering::SeqCst))).collect()
	}

	async fn save_scenes(&self) -> Result<(), EngineError> {
		let models: Vec<Scene> = self.scenes.lock().await.values().map(|s| s.model.clone()).collect();
		store::save_models(&self.scenes_path, &models).await
	}

	fn on_scene_is_set(scene: &Arc<InternalScene>) -> ActionFn {
		let scene = Arc::downgrade(scene);
		Arc::new(move |cm| {
			let scene = scene.clone();
			Box::pin(async move {
				let Some(scene) = scene.upgrade() else {
					return Ok(());
				};
				info!(scene = %scene.model.name, "scene is set");
				scene.is_set.store(true, Ordering::SeqCst);
				// The install-time firing has served its purpose.
				scene.set_trigger.set_trigger_always(false);
				cm.remove_condition(&scene.set_trigger).await?;
				cm.add_condition(scene.unset_trigger.clone()).await
			})
		})
	}

	fn on_scene_is_unset(scene: &Arc<InternalScene>) -> ActionFn {
		let scene = Arc::downgrade(scene);
		Arc::new(move |cm| {
			let scene = scene.clone();
			Box::pin(async move {
				let Some(scene) = scene.upgrade() else {
					return Ok(());
				};
				info!(scene = %scene.model.name, "scene is no longer set");
				scene.is_set.store(false, Ordering::SeqCst);
				cm.remove_condition(&scene.unset_trigger).await?;
				cm.add_condition(scene.set_trigger.clone()).await
			})
		})
	}
}
