use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The fixed set of device capabilities the engine understands.
///
/// Anything else a device advertises is ignored at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
	Switch,
	SwitchLevel,
	MotionSensor,
	ContactSensor,
	TemperatureMeasurement,
	RelativeHumidityMeasurement,
	GarageDoorControl,
}

/// Schema for a single device attribute exposed by a capability.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeSchema {
	pub name: &'static str,
	pub value_type: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub restrictions: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub special_info: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandArgument {
	pub name: &'static str,
	pub value_type: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub restrictions: Option<Value>,
	pub required: bool,
}

/// Schema for a command a capability accepts.
#[derive(Debug, Clone, Serialize)]
pub struct CommandSchema {
	pub name: &'static str,
	pub arguments: Vec<CommandArgument>,
}

impl Capability {
	pub const ALL: [Self; 7] = [
		Self::Switch,
		Self::SwitchLevel,
		Self::MotionSensor,
		Self::ContactSensor,
		Self::TemperatureMeasurement,
		Self::RelativeHumidityMeasurement,
		Self::GarageDoorControl,
	];

	pub fn from_name(name: &str) -> Option<Self> {
		match name {
			"Switch" => Some(Self::Switch),
			"SwitchLevel" => Some(Self::SwitchLevel),
			"MotionSensor" => Some(Self::MotionSensor),
			"ContactSensor" => Some(Self::ContactSensor),
			"TemperatureMeasurement" => Some(Self::TemperatureMeasurement),
			"RelativeHumidityMeasurement" => Some(Self::RelativeHumidityMeasurement),
			"GarageDoorControl" => Some(Self::GarageDoorControl),
			_ => None,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			Self::Switch => "Switch",
			Self::SwitchLevel => "SwitchLevel",
			Self::MotionSensor => "MotionSensor",
			Self::ContactSensor => "ContactSensor",
			Self::TemperatureMeasurement => "TemperatureMeasurement",
			Self::RelativeHumidityMeasurement => "RelativeHumidityMeasurement",
			Self::GarageDoorControl => "GarageDoorControl",
		}
	}

	/// The attributes devices with this capability report.
	pub fn attributes(self) -> Vec<AttributeSchema> {
		match self {
			Self::Switch => vec![AttributeSchema {
				name: "switch",
				value_type: "string",
				restrictions: Some(json!({"enum": ["on", "off"]})),
				special_info: None,
			}],
			Self::SwitchLevel => vec![AttributeSchema {
				name: "level",
				value_type: "integer",
				restrictions: Some(json!({"minimum": 0, "maximum": 100})),
				special_info: Some("A value above 0 indicates that the 'switch' attribute is 'on'"),
			}],
			Self::MotionSensor => vec![AttributeSchema {
				name: "motion",
				value_type: "string",
				restrictions: Some(json!({"enum": ["active", "inactive"]})),
				special_info: Some("'active' indicates current motion, 'inactive' indicates no motion"),
			}],
			Self::ContactSensor => vec![AttributeSchema {
				name: "contact",
				value_type: "string",
				restrictions: Some(json!({"enum": ["closed", "open"]})),
				special_info: None,
			}],
			Self::TemperatureMeasurement => vec![AttributeSchema {
				name: "temperature",
				value_type: "number",
				restrictions: None,
				special_info: None,
			}],
			Self::RelativeHumidityMeasurement => vec![AttributeSchema {
				name: "humidity",
				value_type: "number",
				restrictions: Some(json!({"minimum": 0, "maximum": 100})),
				special_info: None,
			}],
			Self::GarageDoorControl => vec![AttributeSchema {
				name: "door",
				value_type: "string",
				restrictions: Some(json!({"enum": ["unknown", "closing", "closed", "opening", "open"]})),
				special_info: None,
			}],
		}
	}

	/// The commands devices with this capability accept.
	pub fn commands(self) -> Vec<CommandSchema> {
		match self {
			Self::Switch => vec![CommandSchema { name: "on", arguments: vec![] }, CommandSchema { name: "off", arguments: vec![] }],
			Self::SwitchLevel => vec![CommandSchema {
				name: "setLevel",
				arguments: vec![CommandArgument {
					name: "level",
					value_type: "integer",
					restrictions: Some(json!({"minimum": 0, "maximum": 100})),
					required: true,
				}],
			}],
			Self::GarageDoorControl => vec![CommandSchema { name: "open", arguments: vec![] }, CommandSchema { name: "close", arguments: vec![] }],
			Self::MotionSensor | Self::ContactSensor | Self::TemperatureMeasurement | Self::RelativeHumidityMeasurement => vec![],
		}
	}
}
