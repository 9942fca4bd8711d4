//! Declarative rule and scene models.
//!
//! These are the documents the assistant produces and the persistence layer
//! stores; the engine compiles them into live condition nodes.

use std::fmt;

use hub_client::{AttributeValue, DeviceId};
use serde::{Deserialize, Serialize};

/// Comparison applied between a device attribute and a reference value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOperator {
	#[serde(rename = "=")]
	Eq,
	#[serde(rename = "!=")]
	Ne,
	#[serde(rename = "<")]
	Lt,
	#[serde(rename = "<=")]
	Le,
	#[serde(rename = ">")]
	Gt,
	#[serde(rename = ">=")]
	Ge,
	#[serde(rename = "changed")]
	Changed,
}

impl fmt::Display for CompareOperator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Eq => "=",
			Self::Ne => "!=",
			Self::Lt => "<",
			Self::Le => "<=",
			Self::Gt => ">",
			Self::Ge => ">=",
			Self::Changed => "changed",
		};
		write!(f, "{s}")
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanOperator {
	And,
	Or,
	Not,
}

impl fmt::Display for BooleanOperator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::And => "and",
			Self::Or => "or",
			Self::Not => "not",
		};
		write!(f, "{s}")
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOperator {
	Is,
	Before,
	After,
}

impl fmt::Display for TimeOperator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Is => "is",
			Self::Before => "before",
			Self::After => "after",
		};
		write!(f, "{s}")
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConditionModel {
	pub device_id: DeviceId,
	/// The name of the device attribute to check the value of.
	pub attribute: String,
	pub operator: CompareOperator,
	/// The value the attribute is compared to.
	pub value: AttributeValue,
	/// How long (in seconds) the condition must remain true before actions
	/// are triggered.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanConditionModel {
	pub operator: BooleanOperator,
	pub conditions: Vec<ConditionModel>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeOfDayModel {
	pub operator: TimeOperator,
	pub hour: u32,
	pub minute: u32,
}

/// A condition as the declarative model spells it, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionModel {
	DeviceCondition(DeviceConditionModel),
	BooleanCondition(BooleanConditionModel),
	TimeOfDay(TimeOfDayModel),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceControlModel {
	pub device_id: DeviceId,
	pub command: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arguments: Option<Vec<AttributeValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfThenElseModel {
	pub if_condition: ConditionModel,
	pub then_actions: Vec<ActionModel>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub else_actions: Option<Vec<ActionModel>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneActionModel {
	pub scene_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UntilModel {
	/// The condition to wait for.
	pub condition: ConditionModel,
	/// Maximum seconds to wait before giving up.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout: Option<u64>,
	pub until_actions: Vec<ActionModel>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout_actions: Option<Vec<ActionModel>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitModel {
	/// The condition to wait for; a pure delay when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub condition: Option<ConditionModel>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout: Option<u64>,
	/// Whether rule execution ends when the timeout is reached.
	#[serde(default)]
	pub end_on_timeout: bool,
}

/// An action step in a rule program, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionModel {
	DeviceControl(DeviceControlModel),
	IfThenElse(IfThenElseModel),
	Scene(SceneActionModel),
	Until(UntilModel),
	Wait(WaitModel),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
	pub name: String,
	/// A brief one sentence description of the rule.
	pub description: String,
	/// The condition whose rising edge starts the actions.
	pub trigger: ConditionModel,
	pub actions: Vec<ActionModel>,
}

/// One device setting inside a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSetting {
	pub device_id: DeviceId,
	pub command: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arguments: Option<Vec<AttributeValue>>,
	/// Condition which, if true, indicates the setting is active.
	pub check: ConditionModel,
}

/// A collection of devices and the state they should be in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub settings: Vec<SceneSetting>,
}
