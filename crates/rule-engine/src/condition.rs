//! Condition kinds and the nodes the process manager installs.
//!
//! A [`ConditionNode`] bundles the immutable shape of a condition (identity,
//! observed attributes, children, timers) with its mutable evaluator state
//! and the action slots the managers wire up before installation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime, Timelike};
use hub_client::{AttributeValue, DeviceEvent, DeviceId};
use tokio::sync::Mutex;

use crate::error::EngineError;
use crate::model::{BooleanConditionModel, BooleanOperator, CompareOperator, ConditionModel, DeviceConditionModel, TimeOfDayModel, TimeOperator};
use crate::process::ActionFn;

/// Snapshot of device attribute values keyed by device and attribute name.
pub type DeviceSnapshot = HashMap<DeviceId, HashMap<String, AttributeValue>>;

/// Distinguishes separately installed instances of syntactically identical
/// conditions.
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

fn next_instance() -> u64 {
	NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed)
}

/// The mutable half of a condition: seeded from an engine snapshot, updated
/// by events, and evaluated into a truth value.
pub trait ConditionEval: Send {
	/// Seed internal state from the engine's snapshot; returns initial truth.
	fn initialize(&mut self, attrs: &DeviceSnapshot, sub_states: &HashMap<String, bool>) -> bool;

	fn on_device_event(&mut self, _event: &DeviceEvent) {}

	fn on_sub_condition_change(&mut self, _child_id: &str, _state: bool) {}

	/// Pure evaluation over the stored inputs.
	fn evaluate(&self) -> bool;
}

/// An installable node in the reactive graph.
pub struct ConditionNode {
	id: String,
	devices: HashMap<DeviceId, HashSet<String>>,
	sub_conditions: Vec<Arc<ConditionNode>>,
	duration: Option<Duration>,
	timeout: Option<Duration>,
	check_times: Vec<NaiveTime>,
	trigger_always: AtomicBool,
	eval: Mutex<Box<dyn ConditionEval>>,
	action: Mutex<Option<ActionFn>>,
	timeout_action: Mutex<Option<ActionFn>>,
}

impl ConditionNode {
	pub(crate) fn new(
		base_id: &str,
		devices: HashMap<DeviceId, HashSet<String>>,
		sub_conditions: Vec<Arc<ConditionNode>>,
		duration: Option<Duration>,
		timeout: Option<Duration>,
		check_times: Vec<NaiveTime>,
		eval: Box<dyn ConditionEval>,
	) -> Arc<Self> {
		Arc::new(Self {
			id: format!("{base_id}#{}", next_instance()),
			devices,
			sub_conditions,
			duration,
			timeout,
			check_times,
			trigger_always: AtomicBool::new(false),
			eval: Mutex::new(eval),
			action: Mutex::new(None),
			timeout_action: Mutex::new(None),
		})
	}

	/// A condition over a single device attribute.
	pub fn device(model: &DeviceConditionModel, duration: Option<Duration>, timeout: Option<Duration>) -> Arc<Self> {
		let base = format!("device({}-{} {} {})", model.device_id, model.attribute, model.operator, model.value);
		let devices = HashMap::from([(model.device_id, HashSet::from([model.attribute.clone()]))]);
		let eval = DeviceStateCondition {
			device_id: model.device_id,
			attribute: model.attribute.clone(),
			operator: model.operator,
			value: model.value.clone(),
			current: AttributeValue::Null,
			previous: AttributeValue::Null,
		};
		Self::new(&base, devices, Vec::new(), duration, timeout, Vec::new(), Box::new(eval))
	}

	/// A boolean combinator over freshly compiled sub-conditions.
	pub fn boolean(model: &BooleanConditionModel, duration: Option<Duration>, timeout: Option<Duration>) -> Result<Arc<Self>, EngineError> {
		if model.operator == BooleanOperator::Not && model.conditions.len() != 1 {
			return Err(EngineError::NotArity(model.conditions.len()));
		}
		let children = model.conditions.iter().map(|c| condition_for_model(c, None)).collect::<Result<Vec<_>, _>>()?;
		Ok(Self::combinator(model.operator, children, duration, timeout))
	}

	/// A boolean combinator over already constructed nodes.
	pub fn combinator(operator: BooleanOperator, children: Vec<Arc<Self>>, duration: Option<Duration>, timeout: Option<Duration>) -> Arc<Self> {
		let base = match operator {
			BooleanOperator::Not => format!("not ({})", children[0].id()),
			_ => children.iter().map(|c| format!("({})", c.id())).collect::<Vec<_>>().join(&format!(" {operator} ")),
		};
		let eval = BooleanStateCondition {
			operator,
			sub_states: children.iter().map(|c| (c.id().to_string(), false)).collect(),
		};
		Self::new(&base, HashMap::new(), children, duration, timeout, Vec::new(), Box::new(eval))
	}

	/// A condition over the local time of day.
	///
	/// Observes no devices; the engine re-evaluates it at its check times.
	pub fn time_of_day(model: &TimeOfDayModel, timeout: Option<Duration>) -> Result<Arc<Self>, EngineError> {
		let target = NaiveTime::from_hms_opt(model.hour, model.minute, 0).ok_or(EngineError::InvalidTime {
			hour: model.hour,
			minute: model.minute,
		})?;
		let base = format!("time_of_day({} {:02}:{:02})", model.operator, model.hour, model.minute);
		let mut check_times = vec![target];
		if model.operator == TimeOperator::Is {
			// Re-check a minute later so the condition can fall back to false.
			check_times.push(target + chrono::Duration::minutes(1));
		}
		let eval = TimeOfDayStateCondition { operator: model.operator, target };
		Ok(Self::new(&base, HashMap::new(), Vec::new(), None, timeout, check_times, Box::new(eval)))
	}

	/// A condition that is always met; the no-op predicate for pure delays.
	pub fn always_true(timeout: Option<Duration>) -> Arc<Self> {
		Self::new("true", HashMap::new(), Vec::new(), None, timeout, Vec::new(), Box::new(TrueCondition))
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn devices(&self) -> &HashMap<DeviceId, HashSet<String>> {
		&self.devices
	}

	pub fn sub_conditions(&self) -> &[Arc<ConditionNode>] {
		&self.sub_conditions
	}

	pub fn duration(&self) -> Option<Duration> {
		self.duration
	}

	pub fn timeout(&self) -> Option<Duration> {
		self.timeout
	}

	pub fn check_times(&self) -> &[NaiveTime] {
		&self.check_times
	}

	pub fn trigger_always(&self) -> bool {
		self.trigger_always.load(Ordering::SeqCst)
	}

	pub fn set_trigger_always(&self, value: bool) {
		self.trigger_always.store(value, Ordering::SeqCst);
	}

	pub async fn set_action(&self, action: ActionFn) {
		*self.action.lock().await = Some(action);
	}

	pub async fn set_timeout_action(&self, action: ActionFn) {
		*self.timeout_action.lock().await = Some(action);
	}

	pub(crate) async fn action(&self) -> Option<ActionFn> {
		self.action.lock().await.clone()
	}

	pub(crate) async fn timeout_action(&self) -> Option<ActionFn> {
		self.timeout_action.lock().await.clone()
	}

	pub(crate) fn eval(&self) -> &Mutex<Box<dyn ConditionEval>> {
		&self.eval
	}
}

/// Compile a declarative condition into an installable node.
pub fn condition_for_model(model: &ConditionModel, timeout: Option<Duration>) -> Result<Arc<ConditionNode>, EngineError> {
	match model {
		ConditionModel::DeviceCondition(m) => Ok(ConditionNode::device(m, m.duration.map(Duration::from_secs), timeout)),
		ConditionModel::BooleanCondition(m) => ConditionNode::boolean(m, m.duration.map(Duration::from_secs), timeout),
		ConditionModel::TimeOfDay(m) => ConditionNode::time_of_day(m, timeout),
	}
}

struct DeviceStateCondition {
	device_id: DeviceId,
	attribute: String,
	operator: CompareOperator,
	value: AttributeValue,
	current: AttributeValue,
	previous: AttributeValue,
}

impl ConditionEval for DeviceStateCondition {
	fn initialize(&mut self, attrs: &DeviceSnapshot, _sub_states: &HashMap<String, bool>) -> bool {
		let raw = attrs.get(&self.device_id).and_then(|a| a.get(&self.attribute)).cloned().unwrap_or(AttributeValue::Null);
		self.current = raw.coerce_to(&self.value);
		self.previous = self.current.clone();
		self.evaluate()
	}

	fn on_device_event(&mut self, event: &DeviceEvent) {
		if event.device_id == self.device_id && event.attribute == self.attribute {
			self.previous = std::mem::replace(&mut self.current, event.value.coerce_to(&self.value));
		}
	}

	fn evaluate(&self) -> bool {
		match self.operator {
			CompareOperator::Eq => self.current == self.value,
			CompareOperator::Ne => self.current != self.value,
			CompareOperator::Lt => matches!(self.current.partial_cmp(&self.value), Some(std::cmp::Ordering::Less)),
			CompareOperator::Le => matches!(self.current.partial_cmp(&self.value), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
			CompareOperator::Gt => matches!(self.current.partial_cmp(&self.value), Some(std::cmp::Ordering::Greater)),
			CompareOperator::Ge => matches!(self.current.partial_cmp(&self.value), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
			CompareOperator::Changed => self.previous != self.current,
		}
	}
}

struct BooleanStateCondition {
	operator: BooleanOperator,
	/// Child identifier and its last reported truth, in declaration order.
	sub_states: Vec<(String, bool)>,
}

impl ConditionEval for BooleanStateCondition {
	fn initialize(&mut self, _attrs: &DeviceSnapshot, sub_states: &HashMap<String, bool>) -> bool {
		for (id, state) in &mut self.sub_states {
			if let Some(initial) = sub_states.get(id) {
				*state = *initial;
			}
		}
		self.evaluate()
	}

	fn on_sub_condition_change(&mut self, child_id: &str, state: bool) {
		for (id, stored) in &mut self.sub_states {
			if id == child_id {
				*stored = state;
			}
		}
	}

	fn evaluate(&self) -> bool {
		match self.operator {
			BooleanOperator::And => self.sub_states.iter().all(|(_, s)| *s),
			BooleanOperator::Or => self.sub_states.iter().any(|(_, s)| *s),
			BooleanOperator::Not => !self.sub_states.first().is_some_and(|(_, s)| *s),
		}
	}
}

struct TimeOfDayStateCondition {
	operator: TimeOperator,
	target: NaiveTime,
}

impl TimeOfDayStateCondition {
	fn evaluate_at(&self, now: NaiveTime) -> bool {
		// Compare at minute granularity.
		let now = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(now);
		match self.operator {
			TimeOperator::Is => now == self.target,
			TimeOperator::Before => now < self.target,
			TimeOperator::After => now >= self.target,
		}
	}
}

impl ConditionEval for TimeOfDayStateCondition {
	fn initialize(&mut self, _attrs: &DeviceSnapshot, _sub_states: &HashMap<String, bool>) -> bool {
		self.evaluate()
	}

	fn evaluate(&self) -> bool {
		self.evaluate_at(Local::now().time())
	}
}

struct TrueCondition;

impl ConditionEval for TrueCondition {
	fn initialize(&mut self, _attrs: &DeviceSnapshot, _sub_states: &HashMap<String, bool>) -> bool {
		true
	}

	fn evaluate(&self) -> bool {
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn switch_model(device_id: DeviceId, operator: CompareOperator, value: &str) -> DeviceConditionModel {
		DeviceConditionModel {
			device_id,
			attribute: "switch".to_string(),
			operator,
			value: AttributeValue::from(value),
			duration: None,
		}
	}

	fn snapshot(device_id: DeviceId, attribute: &str, value: AttributeValue) -> DeviceSnapshot {
		HashMap::from([(device_id, HashMap::from([(attribute.to_string(), value)]))])
	}

	fn event(device_id: DeviceId, attribute: &str, value: AttributeValue) -> DeviceEvent {
		DeviceEvent {
			device_id,
			attribute: attribute.to_string(),
			value,
		}
	}

	#[tokio::test]
	async fn test_device_condition_tracks_events() {
		let node = ConditionNode::device(&switch_model(7, CompareOperator::Eq, "on"), None, None);
		let mut eval = node.eval().lock().await;
		assert!(!eval.initialize(&snapshot(7, "switch", AttributeValue::from("off")), &HashMap::new()));

		eval.on_device_event(&event(7, "switch", AttributeValue::from("on")));
		assert!(eval.evaluate());
		eval.on_device_event(&event(7, "switch", AttributeValue::from("off")));
		assert!(!eval.evaluate());
	}

	#[tokio::test]
	async fn test_device_condition_ignores_other_attributes() {
		let node = ConditionNode::device(&switch_model(7, CompareOperator::Eq, "on"), None, None);
		let mut eval = node.eval().lock().await;
		eval.initialize(&snapshot(7, "switch", AttributeValue::from("on")), &HashMap::new());

		eval.on_device_event(&event(7, "level", AttributeValue::Int(0)));
		assert!(eval.evaluate(), "an unrelated attribute must not disturb state");
	}

	#[tokio::test]
	async fn test_numeric_comparison_coerces_strings() {
		let model = DeviceConditionModel {
			device_id: 3,
			attribute: "temperature".to_string(),
			operator: CompareOperator::Gt,
			value: AttributeValue::Number(70.0),
			duration: None,
		};
		let node = ConditionNode::device(&model, None, None);
		let mut eval = node.eval().lock().await;
		// The hub reports numbers as strings on some firmware.
		assert!(!eval.initialize(&snapshot(3, "temperature", AttributeValue::from("68.5")), &HashMap::new()));
		eval.on_device_event(&event(3, "temperature", AttributeValue::from("71.2")));
		assert!(eval.evaluate());
	}

	#[tokio::test]
	async fn test_changed_operator() {
		let model = DeviceConditionModel {
			device_id: 3,
			attribute: "contact".to_string(),
			operator: CompareOperator::Changed,
			value: AttributeValue::from(""),
			duration: None,
		};
		let node = ConditionNode::device(&model, None, None);
		let mut eval = node.eval().lock().await;
		assert!(!eval.initialize(&snapshot(3, "contact", AttributeValue::from("closed")), &HashMap::new()), "initial state is unchanged");

		eval.on_device_event(&event(3, "contact", AttributeValue::from("open")));
		assert!(eval.evaluate());
		eval.on_device_event(&event(3, "contact", AttributeValue::from("open")));
		assert!(!eval.evaluate(), "same value twice is not a change");
	}

	#[tokio::test]
	async fn test_boolean_truth_tables() {
		for (operator, a, b, expected) in [
			(BooleanOperator::And, true, true, true),
			(BooleanOperator::And, true, false, false),
			(BooleanOperator::Or, false, false, false),
			(BooleanOperator::Or, true, false, true),
		] {
			let left = ConditionNode::device(&switch_model(1, CompareOperator::Eq, "on"), None, None);
			let right = ConditionNode::device(&switch_model(2, CompareOperator::Eq, "on"), None, None);
			let left_id = left.id().to_string();
			let right_id = right.id().to_string();
			let parent = ConditionNode::combinator(operator, vec![left, right], None, None);

			let mut eval = parent.eval().lock().await;
			let states = HashMap::from([(left_id, a), (right_id, b)]);
			assert_eq!(eval.initialize(&HashMap::new(), &states), expected, "{operator} {a} {b}");
		}
	}

	#[tokio::test]
	async fn test_not_inverts_child() {
		let child = ConditionNode::device(&switch_model(1, CompareOperator::Eq, "on"), None, None);
		let child_id = child.id().to_string();
		let parent = ConditionNode::combinator(BooleanOperator::Not, vec![child], None, None);

		let mut eval = parent.eval().lock().await;
		assert!(eval.initialize(&HashMap::new(), &HashMap::from([(child_id.clone(), false)])));
		eval.on_sub_condition_change(&child_id, true);
		assert!(!eval.evaluate());
	}

	#[test]
	fn test_not_requires_exactly_one_child() {
		let model = BooleanConditionModel {
			operator: BooleanOperator::Not,
			conditions: vec![
				ConditionModel::DeviceCondition(switch_model(1, CompareOperator::Eq, "on")),
				ConditionModel::DeviceCondition(switch_model(2, CompareOperator::Eq, "on")),
			],
			duration: None,
		};
		assert!(matches!(ConditionNode::boolean(&model, None, None), Err(EngineError::NotArity(2))));
	}

	#[test]
	fn test_identifiers_are_unique_per_instance() {
		let model = switch_model(1, CompareOperator::Eq, "on");
		let a = ConditionNode::device(&model, None, None);
		let b = ConditionNode::device(&model, None, None);
		assert_ne!(a.id(), b.id());
	}

	#[test]
	fn test_time_of_day_check_times() {
		let is = ConditionNode::time_of_day(
			&TimeOfDayModel {
				operator: TimeOperator::Is,
				hour: 7,
				minute: 30,
			},
			None,
		)
		.unwrap();
		assert_eq!(is.check_times(), &[NaiveTime::from_hms_opt(7, 30, 0).unwrap(), NaiveTime::from_hms_opt(7, 31, 0).unwrap()]);

		let after = ConditionNode::time_of_day(
			&TimeOfDayModel {
				operator: TimeOperator::After,
				hour: 22,
				minute: 0,
			},
			None,
		)
		.unwrap();
		assert_eq!(after.check_times(), &[NaiveTime::from_hms_opt(22, 0, 0).unwrap()]);
	}

	#[test]
	fn test_time_of_day_carries_timeout() {
		// A wait or until on a time-of-day predicate still has to expire.
		let model = ConditionModel::TimeOfDay(TimeOfDayModel {
			operator: TimeOperator::Is,
			hour: 7,
			minute: 30,
		});
		let node = condition_for_model(&model, Some(Duration::from_secs(600))).unwrap();
		assert_eq!(node.timeout(), Some(Duration::from_secs(600)));
	}

	#[test]
	fn test_time_of_day_rejects_bad_time() {
		let result = ConditionNode::time_of_day(
			&TimeOfDayModel {
				operator: TimeOperator::Is,
				hour: 24,
				minute: 0,
			},
			None,
		);
		assert!(matches!(result, Err(EngineError::InvalidTime { .. })));
	}

	#[test]
	fn test_evaluate_at_truncates_seconds() {
		let cond = TimeOfDayStateCondition {
			operator: TimeOperator::Is,
			target: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
		};
		assert!(cond.evaluate_at(NaiveTime::from_hms_opt(7, 30, 45).unwrap()));
		assert!(!cond.evaluate_at(NaiveTime::from_hms_opt(7, 31, 0).unwrap()));

		let before = TimeOfDayStateCondition {
			operator: TimeOperator::Before,
			target: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
		};
		assert!(before.evaluate_at(NaiveTime::from_hms_opt(7, 29, 59).unwrap()));
		assert!(!before.evaluate_at(NaiveTime::from_hms_opt(7, 30, 0).unwrap()));

		let after = TimeOfDayStateCondition {
			operator: TimeOperator::After,
			target: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
		};
		assert!(after.evaluate_at(NaiveTime::from_hms_opt(7, 30, 0).unwrap()), "'after' includes the target minute");
	}

	#[tokio::test]
	async fn test_true_condition() {
		let node = ConditionNode::always_true(Some(Duration::from_secs(5)));
		assert!(node.eval().lock().await.initialize(&HashMap::new(), &HashMap::new()));
		assert_eq!(node.timeout(), Some(Duration::from_secs(5)));
	}

	#[test]
	fn test_compile_nested_boolean_installs_structure() {
		let model = ConditionModel::BooleanCondition(BooleanConditionModel {
			operator: BooleanOperator::And,
			conditions: vec![
				ConditionModel::DeviceCondition(switch_model(1, CompareOperator::Eq, "on")),
				ConditionModel::DeviceCondition(switch_model(2, CompareOperator::Ne, "off")),
			],
			duration: Some(30),
		});
		let node = condition_for_model(&model, Some(Duration::from_secs(10))).unwrap();
		assert_eq!(node.sub_conditions().len(), 2);
		assert_eq!(node.duration(), Some(Duration::from_secs(30)));
		assert_eq!(node.timeout(), Some(Duration::from_secs(10)));
		assert!(node.devices().is_empty(), "the combinator itself observes no devices");
	}
}
