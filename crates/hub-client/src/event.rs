use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize};

use crate::device::DeviceId;
use crate::value::AttributeValue;

/// An attribute change reported by the hub.
///
/// The hub posts device ids as strings in some firmware revisions and as
/// numbers in others; both are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEvent {
	#[serde(rename = "deviceId", deserialize_with = "device_id_from_string_or_int")]
	pub device_id: DeviceId,
	#[serde(rename = "name")]
	pub attribute: String,
	#[serde(default = "null_value")]
	pub value: AttributeValue,
}

fn null_value() -> AttributeValue {
	AttributeValue::Null
}

fn device_id_from_string_or_int<'de, D>(deserializer: D) -> Result<DeviceId, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum StringOrInt {
		Int(DeviceId),
		Str(String),
	}

	match StringOrInt::deserialize(deserializer)? {
		StringOrInt::Int(id) => Ok(id),
		StringOrInt::Str(s) => s.parse::<DeviceId>().map_err(serde::de::Error::custom),
	}
}

/// Callback invoked for events on a subscribed device.
pub type EventCallback = Arc<dyn Fn(DeviceEvent) -> BoxFuture<'static, ()> + Send + Sync>;
