//! The rule process manager: the reactive engine underneath rules and
//! scenes.
//!
//! Conditions form a directed dependency graph. Device events and check-time
//! clock ticks enter through a single turn lock, update the touched
//! evaluators, propagate outward through the reverse dependency edges, and
//! fire actions on rising edges. Actions receive a restricted handle and may
//! install or remove conditions while the turn is still open, so their
//! effects are visible before the next event is admitted.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use hub_client::{AttributeValue, DeviceEvent, DeviceId, EventCallback};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::clock::ClockService;
use crate::condition::{ConditionNode, DeviceSnapshot};
use crate::error::EngineError;
use crate::hub::HubInterface;
use crate::timers::{TimerCallback, TimerService};

/// Callback attached to a condition, invoked with a restricted manager
/// handle when the condition triggers or times out.
pub type ActionFn = Arc<dyn Fn(ConditionManager) -> BoxFuture<'static, Result<(), EngineError>> + Send + Sync>;

fn duration_timer_id(condition_id: &str) -> String {
	format!("{condition_id}/duration")
}

fn timeout_timer_id(condition_id: &str) -> String {
	format!("{condition_id}/timeout")
}

fn check_clock_id(condition_id: &str, index: usize) -> String {
	format!("{condition_id}/check/{index}")
}

struct ConditionEntry {
	node: Arc<ConditionNode>,
	state: bool,
}

#[derive(Default)]
struct ProcessState {
	/// Installed conditions and their last evaluated truth.
	conditions: HashMap<String, ConditionEntry>,
	/// Reverse dependency edges: child id → ids of parents observing it.
	condition_deps: HashMap<String, HashSet<String>>,
	/// Which conditions watch each device attribute.
	tracked: HashMap<DeviceId, HashMap<String, HashSet<String>>>,
	/// Latest known attribute values.
	latest: HashMap<DeviceId, HashMap<String, AttributeValue>>,
	/// Conditions installed directly, as opposed to introduced as children.
	roots: HashSet<String>,
}

/// Manages the graph of conditions waiting to be met.
pub struct RuleProcessManager {
	hub: Arc<dyn HubInterface>,
	timers: TimerService,
	clock: ClockService,
	/// Serializes event dispatch, installation, and timer fires. Held across
	/// suspension points for the whole of each turn.
	turn: Mutex<()>,
	/// Guards the graph itself; never held across a hub call and released
	/// before actions run so they can re-enter.
	state: Mutex<ProcessState>,
	/// Handed out to timer, clock, and subscription callbacks so they do not
	/// keep the manager alive.
	weak_self: Weak<RuleProcessManager>,
}

impl RuleProcessManager {
	pub fn new(hub: Arc<dyn HubInterface>) -> Arc<Self> {
		Arc::new_cyclic(|weak_self| Self {
			hub,
			timers: TimerService::new(),
			clock: ClockService::new(),
			turn: Mutex::new(()),
			state: Mutex::new(ProcessState::default()),
			weak_self: weak_self.clone(),
		})
	}

	/// Install a condition and everything it implies: sub-conditions,
	/// attribute snapshots, subscriptions, and timers.
	pub async fn add_condition(&self, node: Arc<ConditionNode>) -> Result<(), EngineError> {
		let _turn = self.turn.lock().await;
		self.add_in_turn(node, true).await
	}

	/// Remove a condition, its timers, its device edges, and any
	/// sub-conditions it uniquely introduced.
	pub async fn remove_condition(&self, node: &Arc<ConditionNode>) -> Result<(), EngineError> {
		let _turn = self.turn.lock().await;
		self.remove_in_turn(node).await
	}

	/// The last recorded truth value for an installed condition.
	pub async fn check_state(&self, node: &Arc<ConditionNode>) -> Option<bool> {
		self.state.lock().await.conditions.get(node.id()).map(|e| e.state)
	}

	/// Entry point for device events coming off the hub subscription.
	pub async fn handle_device_event(&self, event: DeviceEvent) {
		let _turn = self.turn.lock().await;
		if let Err(err) = self.device_event_in_turn(&event).await {
			error!(device_id = event.device_id, attribute = %event.attribute, error = %err, "device event processing failed");
		}
	}

	/// Open a turn for callers that interpret actions outside any event.
	pub(crate) async fn begin_turn(&self) -> MutexGuard<'_, ()> {
		self.turn.lock().await
	}

	pub(crate) fn condition_manager(&self) -> ConditionManager {
		ConditionManager { rpm: self.weak_self.clone() }
	}

	pub async fn condition_count(&self) -> usize {
		self.state.lock().await.conditions.len()
	}

	pub async fn tracked_attribute_count(&self) -> usize {
		self.state.lock().await.tracked.values().map(HashMap::len).sum()
	}

	pub async fn cached_attribute_count(&self) -> usize {
		self.state.lock().await.latest.values().map(HashMap::len).sum()
	}

	/// How many check-time clocks are currently armed.
	pub async fn check_clock_count(&self) -> usize {
		self.clock.len().await
	}

	fn add_in_turn<'a>(&'a self, node: Arc<ConditionNode>, is_root: bool) -> BoxFuture<'a, Result<(), EngineError>> {
		Box::pin(async move {
			let id = node.id().to_string();

			// Register device interest, remembering which attribute pairs are new.
			let new_attrs: Vec<(DeviceId, String)> = {
				let mut state = self.state.lock().await;
				if is_root {
					state.roots.insert(id.clone());
				}
				if state.conditions.contains_key(&id) {
					debug!(condition = %id, "condition already installed");
					return Ok(());
				}
				let mut fresh = Vec::new();
				for (device_id, attrs) in node.devices() {
					let tracked = state.tracked.entry(*device_id).or_default();
					for attr in attrs {
						let watchers = tracked.entry(attr.clone()).or_default();
						if watchers.is_empty() {
							fresh.push((*device_id, attr.clone()));
						}
						watchers.insert(id.clone());
					}
				}
				fresh
			};

			// Snapshot newly watched attributes from the hub.
			for (device_id, attr) in &new_attrs {
				let value = self.hub.get_attribute(*device_id, attr).await?;
				self.state.lock().await.latest.entry(*device_id).or_default().insert(attr.clone(), value);
			}

			// Install sub-conditions not already present and record the edges.
			let mut sub_states: HashMap<String, bool> = HashMap::new();
			for child in node.sub_conditions() {
				let installed = {
					let mut state = self.state.lock().await;
					state.condition_deps.entry(child.id().to_string()).or_default().insert(id.clone());
					state.conditions.contains_key(child.id())
				};
				if !installed {
					self.add_in_turn(child.clone(), false).await?;
				}
				let child_state = self.state.lock().await.conditions.get(child.id()).is_some_and(|e| e.state);
				sub_states.insert(child.id().to_string(), child_state);
			}

			// Seed the evaluator and record the initial truth.
			let initial = {
				let mut state = self.state.lock().await;
				let mut attrs: DeviceSnapshot = HashMap::new();
				for (device_id, names) in node.devices() {
					let snapshot = attrs.entry(*device_id).or_default();
					for attr in names {
						if let Some(value) = state.latest.get(device_id).and_then(|m| m.get(attr)) {
							snapshot.insert(attr.clone(), value.clone());
						} else {
							warn!(device_id, attribute = %attr, "attribute missing from cache during install");
						}
					}
				}
				let initial = node.eval().lock().await.initialize(&attrs, &sub_states);
				state.conditions.insert(id.clone(), ConditionEntry { node: node.clone(), state: initial });
				initial
			};

			// Subscribe with the device's full tracked filter for every new pair.
			let subscribe_devices: HashSet<DeviceId> = new_attrs.iter().map(|(d, _)| *d).collect();
			for device_id in subscribe_devices {
				let filter: Vec<String> = self.state.lock().await.tracked.get(&device_id).map(|m| m.keys().cloned().collect()).unwrap_or_default();
				self.hub.subscribe(device_id, filter, self.event_callback()).await;
			}

			if let Some(timeout) = node.timeout() {
				self.timers.start(&timeout_timer_id(&id), timeout, self.timeout_callback(node.clone())).await;
			}
			for (index, check_time) in node.check_times().iter().enumerate() {
				self.clock.start(&check_clock_id(&id, index), *check_time, self.check_time_callback(node.clone())).await;
			}

			if initial {
				if node.duration().is_some() {
					// Already true on install: the debounce clock starts now.
					self.arm_duration_timer(&node).await;
				} else if node.trigger_always() {
					self.fire_action(&node).await?;
				}
			}
			Ok(())
		})
	}

	fn remove_in_turn<'a>(&'a self, node: &'a Arc<ConditionNode>) -> BoxFuture<'a, Result<(), EngineError>> {
		Box::pin(async move {
			let id = node.id().to_string();

			self.timers.cancel(&duration_timer_id(&id)).await;
			self.timers.cancel(&timeout_timer_id(&id)).await;
			for index in 0..node.check_times().len() {
				self.clock.cancel(&check_clock_id(&id, index)).await;
			}

			let present = {
				let mut state = self.state.lock().await;
				state.roots.remove(&id);
				state.conditions.remove(&id).is_some()
			};
			if !present {
				debug!(condition = %id, "removing condition that is not installed");
				return Ok(());
			}
			debug!(condition = %id, "removing condition");

			// Detach device edges; on 1→0 transitions forget the cache and fix
			// up the hub subscription.
			let mut unsubscribes: Vec<DeviceId> = Vec::new();
			let mut resubscribes: Vec<(DeviceId, Vec<String>)> = Vec::new();
			{
				let mut guard = self.state.lock().await;
				let state = &mut *guard;
				for (device_id, attrs) in node.devices() {
					let Some(tracked_attrs) = state.tracked.get_mut(device_id) else {
						warn!(device_id, "device missing from tracking on removal");
						continue;
					};
					let mut dropped_any = false;
					for attr in attrs {
						let Some(watchers) = tracked_attrs.get_mut(attr) else {
							warn!(device_id, attribute = %attr, "attribute missing from tracking on removal");
							continue;
						};
						watchers.remove(&id);
						if watchers.is_empty() {
							tracked_attrs.remove(attr);
							dropped_any = true;
							let cache_empty = state.latest.get_mut(device_id).map(|cache| {
								cache.remove(attr);
								cache.is_empty()
							});
							if cache_empty == Some(true) {
								state.latest.remove(device_id);
							}
						}
					}
					let remaining: Vec<String> = state.tracked.get(device_id).map(|m| m.keys().cloned().collect()).unwrap_or_default();
					if remaining.is_empty() {
						state.tracked.remove(device_id);
						unsubscribes.push(*device_id);
					} else if dropped_any {
						resubscribes.push((*device_id, remaining));
					}
				}
				state.condition_deps.remove(&id);
			}
			for device_id in unsubscribes {
				self.hub.unsubscribe(device_id).await;
			}
			for (device_id, filter) in resubscribes {
				self.hub.subscribe(device_id, filter, self.event_callback()).await;
			}

			// Release children this condition uniquely introduced.
			for child in node.sub_conditions() {
				let release = {
					let mut state = self.state.lock().await;
					let now_orphaned = match state.condition_deps.get_mut(child.id()) {
						Some(parents) => {
							parents.remove(&id);
							parents.is_empty()
						}
						None => false,
					};
					if now_orphaned {
						state.condition_deps.remove(child.id());
					}
					now_orphaned && !state.roots.contains(child.id()) && state.conditions.contains_key(child.id())
				};
				if release {
					self.remove_in_turn(child).await?;
				}
			}
			Ok(())
		})
	}

	async fn device_event_in_turn(&self, event: &DeviceEvent) -> Result<(), EngineError> {
		let impacted: Vec<Arc<ConditionNode>> = {
			let mut state = self.state.lock().await;
			let watcher_ids: Vec<String> = match state.tracked.get(&event.device_id).and_then(|m| m.get(&event.attribute)) {
				Some(watchers) => watchers.iter().cloned().collect(),
				None => {
					debug!(device_id = event.device_id, attribute = %event.attribute, "event for untracked attribute");
					return Ok(());
				}
			};
			state.latest.entry(event.device_id).or_default().insert(event.attribute.clone(), event.value.clone());
			watcher_ids.iter().filter_map(|cid| state.conditions.get(cid).map(|e| e.node.clone())).collect()
		};

		for node in &impacted {
			node.eval().lock().await.on_device_event(event);
		}

		self.propagate_and_fire(impacted).await
	}

	/// Shared propagation entry for device events and check-time ticks.
	async fn propagate_and_fire(&self, roots: Vec<Arc<ConditionNode>>) -> Result<(), EngineError> {
		let (previous, touched) = {
			let mut guard = self.state.lock().await;
			let state = &mut *guard;
			let previous: HashMap<String, bool> = state.conditions.iter().map(|(k, e)| (k.clone(), e.state)).collect();
			let touched = Self::propagate(state, roots).await;
			(previous, touched)
		};

		// Actions run with the state lock released so they can mutate the graph.
		for id in touched {
			let entry = {
				let state = self.state.lock().await;
				state.conditions.get(&id).map(|e| (e.node.clone(), e.state))
			};
			let Some((node, current)) = entry else {
				continue;
			};
			if node.action().await.is_none() {
				continue;
			}
			let prev = previous.get(&id).copied().unwrap_or(false);

			if node.duration().is_some() {
				if !prev && current {
					self.arm_duration_timer(&node).await;
				} else if prev && !current {
					self.timers.cancel(&duration_timer_id(&id)).await;
				}
			} else if (!prev && current) || (current && node.trigger_always()) {
				self.fire_action(&node).await?;
			}
		}
		Ok(())
	}

	/// Breadth-first traversal outward through the reverse dependency edges.
	///
	/// No visited-set deduplication: every edge is walked every time so
	/// parents reliably see the freshest child state.
	async fn propagate(state: &mut ProcessState, roots: Vec<Arc<ConditionNode>>) -> Vec<String> {
		let mut work: VecDeque<Arc<ConditionNode>> = roots.into();
		let mut touched: Vec<String> = Vec::new();
		let mut seen: HashSet<String> = HashSet::new();

		while let Some(current) = work.pop_front() {
			let id = current.id().to_string();
			if seen.insert(id.clone()) {
				touched.push(id.clone());
			}
			if !state.conditions.contains_key(&id) {
				continue;
			}
			let new_state = current.eval().lock().await.evaluate();
			if let Some(entry) = state.conditions.get_mut(&id) {
				if entry.state != new_state {
					entry.state = new_state;
				}
			}

			let parent_ids: Vec<String> = state.condition_deps.get(&id).map(|parents| parents.iter().cloned().collect()).unwrap_or_default();
			for parent_id in parent_ids {
				if let Some(parent) = state.conditions.get(&parent_id).map(|e| e.node.clone()) {
					parent.eval().lock().await.on_sub_condition_change(&id, new_state);
					work.push_back(parent);
				}
			}
		}
		touched
	}

	/// Invoke a condition's action, cancelling its timers first so a
	/// debounced firing cannot race its own timeout.
	async fn fire_action(&self, node: &Arc<ConditionNode>) -> Result<(), EngineError> {
		self.timers.cancel(&duration_timer_id(node.id())).await;
		self.timers.cancel(&timeout_timer_id(node.id())).await;
		if let Some(action) = node.action().await {
			debug!(condition = node.id(), "condition triggered");
			action(self.condition_manager()).await?;
		}
		Ok(())
	}

	async fn arm_duration_timer(&self, node: &Arc<ConditionNode>) {
		if let Some(duration) = node.duration() {
			debug!(condition = node.id(), seconds = duration.as_secs_f64(), "arming duration timer");
			self.timers.start(&duration_timer_id(node.id()), duration, self.duration_callback(node.clone())).await;
		}
	}

	fn event_callback(&self) -> EventCallback {
		let weak = self.weak_self.clone();
		Arc::new(move |event| {
			let weak = weak.clone();
			Box::pin(async move {
				if let Some(rpm) = weak.upgrade() {
					rpm.handle_device_event(event).await;
				}
			})
		})
	}

	fn duration_callback(&self, node: Arc<ConditionNode>) -> TimerCallback {
		let weak = self.weak_self.clone();
		Arc::new(move |_timer_id| {
			let weak = weak.clone();
			let node = node.clone();
			Box::pin(async move {
				if let Some(rpm) = weak.upgrade() {
					rpm.on_duration_expired(node).await;
				}
			})
		})
	}

	fn timeout_callback(&self, node: Arc<ConditionNode>) -> TimerCallback {
		let weak = self.weak_self.clone();
		Arc::new(move |_timer_id| {
			let weak = weak.clone();
			let node = node.clone();
			Box::pin(async move {
				if let Some(rpm) = weak.upgrade() {
					rpm.on_timeout_expired(node).await;
				}
			})
		})
	}

	fn check_time_callback(&self, node: Arc<ConditionNode>) -> TimerCallback {
		let weak = self.weak_self.clone();
		Arc::new(move |_clock_id| {
			let weak = weak.clone();
			let node = node.clone();
			Box::pin(async move {
				if let Some(rpm) = weak.upgrade() {
					rpm.on_check_time(node).await;
				}
			})
		})
	}

	async fn on_duration_expired(&self, node: Arc<ConditionNode>) {
		let _turn = self.turn.lock().await;
		if !self.state.lock().await.conditions.contains_key(node.id()) {
			return;
		}
		if let Err(err) = self.fire_action(&node).await {
			error!(condition = node.id(), error = %err, "duration-delayed action failed");
		}
	}

	async fn on_timeout_expired(&self, node: Arc<ConditionNode>) {
		let _turn = self.turn.lock().await;
		if !self.state.lock().await.conditions.contains_key(node.id()) {
			return;
		}
		self.timers.cancel(&duration_timer_id(node.id())).await;
		if let Some(action) = node.timeout_action().await {
			debug!(condition = node.id(), "condition timed out");
			if let Err(err) = action(self.condition_manager()).await {
				error!(condition = node.id(), error = %err, "timeout action failed");
			}
		}
	}

	async fn on_check_time(&self, node: Arc<ConditionNode>) {
		let _turn = self.turn.lock().await;
		if !self.state.lock().await.conditions.contains_key(node.id()) {
			return;
		}
		if let Err(err) = self.propagate_and_fire(vec![node.clone()]).await {
			error!(condition = node.id(), error = %err, "check-time evaluation failed");
		}
	}
}

/// The restricted manager handle actions are given: just enough to install
/// follow-up conditions and retire finished ones from inside a turn.
#[derive(Clone)]
pub struct ConditionManager {
	rpm: Weak<RuleProcessManager>,
}

impl ConditionManager {
	pub async fn add_condition(&self, node: Arc<ConditionNode>) -> Result<(), EngineError> {
		let Some(rpm) = self.rpm.upgrade() else {
			return Ok(());
		};
		rpm.add_in_turn(node, true).await
	}

	pub async fn remove_condition(&self, node: &Arc<ConditionNode>) -> Result<(), EngineError> {
		let Some(rpm) = self.rpm.upgrade() else {
			return Ok(());
		};
		rpm.remove_in_turn(node).await
	}
}
