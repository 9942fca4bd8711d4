//! Rule installation and the action interpreter.
//!
//! A rule's trigger is compiled into a condition whose action runs the
//! rule's program. The interpreter works head-to-tail through a queue;
//! suspending steps (wait, until) install a fresh condition carrying the
//! rest of the program as a continuation, so nothing blocks a thread while
//! a rule sleeps.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::condition::{condition_for_model, ConditionNode};
use crate::error::EngineError;
use crate::hub::HubInterface;
use crate::model::{ActionModel, Rule};
use crate::process::{ActionFn, ConditionManager, RuleProcessManager};
use crate::scene::SceneManager;
use crate::store;

/// A step in a running rule program; `Exit` is appended internally to close
/// out a rule by re-arming its trigger.
#[derive(Clone)]
enum InternalAction {
	Model(ActionModel),
	Exit,
}

struct InstalledRule {
	rule: Rule,
	trigger: Arc<ConditionNode>,
}

/// Manages the installation and execution of automation rules.
pub struct RuleManager {
	process: Arc<RuleProcessManager>,
	hub: Arc<dyn HubInterface>,
	scenes: Arc<SceneManager>,
	rules: Mutex<HashMap<String, InstalledRule>>,
	rules_path: PathBuf,
	/// Captured by trigger actions so an installed rule does not keep its
	/// manager alive.
	weak_self: Weak<RuleManager>,
}

impl RuleManager {
	pub fn new(process: Arc<RuleProcessManager>, hub: Arc<dyn HubInterface>, scenes: Arc<SceneManager>, rules_path: PathBuf) -> Arc<Self> {
		Arc::new_cyclic(|weak_self| Self {
			process,
			hub,
			scenes,
			rules: Mutex::new(HashMap::new()),
			rules_path,
			weak_self: weak_self.clone(),
		})
	}

	/// Load and install every rule in the rules file.
	///
	/// A rule that fails to install is logged and skipped.
	pub async fn install_saved_rules(&self) -> Result<(), EngineError> {
		let rules: Vec<Rule> = store::load_models(&self.rules_path).await?;
		for rule in rules {
			let name = rule.name.clone();
			if let Err(err) = self.install_rule(rule).await {
				warn!(rule = %name, error = %err, "failed to reinstall saved rule");
			}
		}
		Ok(())
	}

	/// Compile the rule's trigger, install it, and persist the rule set.
	pub async fn install_rule(&self, rule: Rule) -> Result<(), EngineError> {
		if self.rules.lock().await.contains_key(&rule.name) {
			return Err(EngineError::DuplicateRule(rule.name));
		}
		let name = rule.name.clone();

		let trigger = condition_for_model(&rule.trigger, None)?;
		trigger.set_action(self.on_rule_triggered(rule.clone(), trigger.clone())).await;
		self.process.add_condition(trigger.clone()).await?;

		self.rules.lock().await.insert(name.clone(), InstalledRule { rule, trigger });
		self.save_rules().await?;
		info!(rule = %name, "rule installed");
		Ok(())
	}

	/// Remove the rule's trigger and persist. Unknown names are a no-op.
	pub async fn uninstall_rule(&self, name: &str) -> Result<(), EngineError> {
		let Some(installed) = self.rules.lock().await.remove(name) else {
			return Ok(());
		};
		self.process.remove_condition(&installed.trigger).await?;
		self.save_rules().await?;
		info!(rule = %name, "rule uninstalled");
		Ok(())
	}

	pub async fn get_installed_rules(&self) -> Vec<Rule> {
		self.rules.lock().await.values().map(|r| r.rule.clone()).collect()
	}

	pub async fn get_rule_by_name(&self, name: &str) -> Option<Rule> {
		self.rules.lock().await.get(name).map(|r| r.rule.clone())
	}

	/// Execute an ad-hoc action list outside any rule.
	pub async fn run_actions(&self, actions: Vec<ActionModel>) -> Result<(), EngineError> {
		let _turn = self.process.begin_turn().await;
		let cm = self.process.condition_manager();
		self.invoke_actions(&cm, actions.into_iter().map(InternalAction::Model).collect(), None).await
	}

	async fn save_rules(&self) -> Result<(), EngineError> {
		let models: Vec<Rule> = self.rules.lock().await.values().map(|r| r.rule.clone()).collect();
		store::save_models(&self.rules_path, &models).await
	}

	/// Interpret a program until it finishes or suspends.
	///
	/// Synchronous steps loop here; `wait`/`until` park the rest of the
	/// program on a freshly installed condition and return.
	async fn invoke_actions(&self, cm: &ConditionManager, actions: Vec<InternalAction>, rule_trigger: Option<Arc<ConditionNode>>) -> Result<(), EngineError> {
		let mut queue: VecDeque<InternalAction> = actions.into();
		while let Some(action) = queue.pop_front() {
			match action {
				InternalAction::Model(ActionModel::DeviceControl(control)) => {
					self.hub.send_command(control.device_id, &control.command, control.arguments.as_deref()).await?;
				}
				InternalAction::Model(ActionModel::Scene(scene)) => {
					self.scenes.set_scene(&scene.scene_name).await?;
				}
				InternalAction::Model(ActionModel::IfThenElse(branch)) => {
					// Install long enough to read the predicate, then retire it.
					let condition = condition_for_model(&branch.if_condition, None)?;
					cm.add_condition(condition.clone()).await?;
					let met = self.process.check_state(&condition).await.unwrap_or(false);
					cm.remove_condition(&condition).await?;

					let chosen = if met { Some(branch.then_actions) } else { branch.else_actions };
					if let Some(batch) = chosen {
						for item in batch.into_iter().rev() {
							queue.push_front(InternalAction::Model(item));
						}
					}
				}
				InternalAction::Model(ActionModel::Until(until)) => {
					let condition = condition_for_model(&until.condition, until.timeout.map(Duration::from_secs))?;
					let remaining: Vec<InternalAction> = queue.drain(..).collect();

					let mut on_met: Vec<InternalAction> = until.until_actions.into_iter().map(InternalAction::Model).collect();
					on_met.extend(remaining.iter().cloned());
					let mut on_timeout: Vec<InternalAction> = until.timeout_actions.unwrap_or_default().into_iter().map(InternalAction::Model).collect();
					on_timeout.extend(remaining);

					condition.set_action(self.on_condition_triggered(condition.clone(), on_met, rule_trigger.clone())).await;
					condition.set_timeout_action(self.on_condition_timeout(condition.clone(), on_timeout, rule_trigger.clone(), false)).await;
					cm.add_condition(condition).await?;
					return Ok(());
				}
				InternalAction::Model(ActionModel::Wait(wait)) => {
					let timeout = wait.timeout.map(Duration::from_secs);
					let condition = match &wait.condition {
						Some(model) => condition_for_model(model, timeout)?,
						None => ConditionNode::always_true(timeout),
					};
					let remaining: Vec<InternalAction> = queue.drain(..).collect();

					condition.set_action(self.on_condition_triggered(condition.clone(), remaining.clone(), rule_trigger.clone())).await;
					condition.set_timeout_action(self.on_condition_timeout(condition.clone(), remaining, rule_trigger.clone(), wait.end_on_timeout)).await;
					cm.add_condition(condition).await?;
					return Ok(());
				}
				InternalAction::Exit => {
					// Re-arm the rule for its next firing.
					if let Some(trigger) = rule_trigger {
						cm.add_condition(trigger).await?;
					}
					return Ok(());
				}
			}
		}
		Ok(())
	}

	fn on_rule_triggered(&self, rule: Rule, trigger: Arc<ConditionNode>) -> ActionFn {
		let manager = self.weak_self.clone();
		Arc::new(move |cm| {
			let manager = manager.clone();
			let rule = rule.clone();
			let trigger = trigger.clone();
			Box::pin(async move {
				let Some(manager) = manager.upgrade() else {
					return Ok(());
				};
				info!(rule = %rule.name, "rule triggered");
				cm.remove_condition(&trigger).await?;
				let mut actions: Vec<InternalAction> = rule.actions.iter().cloned().map(InternalAction::Model).collect();
				actions.push(InternalAction::Exit);
				manager.invoke_actions(&cm, actions, Some(trigger)).await
			})
		})
	}

	fn on_condition_triggered(&self, condition: Arc<ConditionNode>, actions: Vec<InternalAction>, rule_trigger: Option<Arc<ConditionNode>>) -> ActionFn {
		let manager = self.weak_self.clone();
		Arc::new(move |cm| {
			let manager = manager.clone();
			let condition = condition.clone();
			let actions = actions.clone();
			let rule_trigger = rule_trigger.clone();
			Box::pin(async move {
				let Some(manager) = manager.upgrade() else {
					return Ok(());
				};
				cm.remove_condition(&condition).await?;
				manager.invoke_actions(&cm, actions, rule_trigger).await
			})
		})
	}

	fn on_condition_timeout(&self, condition: Arc<ConditionNode>, actions: Vec<InternalAction>, rule_trigger: Option<Arc<ConditionNode>>, exit_on_timeout: bool) -> ActionFn {
		let manager = self.weak_self.clone();
		Arc::new(move |cm| {
			let manager = manager.clone();
			let condition = condition.clone();
			let actions = actions.clone();
			let rule_trigger = rule_trigger.clone();
			Box::pin(async move {
				let Some(manager) = manager.upgrade() else {
					return Ok(());
				};
				cm.remove_condition(&condition).await?;
				if exit_on_timeout {
					manager.invoke_actions(&cm, vec![InternalAction::Exit], rule_trigger).await
				} else {
					manager.invoke_actions(&cm, actions, rule_trigger).await
				}
			})
		})
	}
}
