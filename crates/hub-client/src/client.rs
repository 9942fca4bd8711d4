use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::capability::Capability;
use crate::device::{DeviceId, HubDevice};
use crate::error::HubError;
use crate::event::{DeviceEvent, EventCallback};
use crate::value::AttributeValue;

/// Raw device record as the hub's `/devices/all` route reports it.
#[derive(Deserialize)]
struct RawDevice {
	#[serde(deserialize_with = "crate::client::string_or_int")]
	id: DeviceId,
	#[serde(default)]
	label: String,
	#[serde(default)]
	room: String,
	#[serde(default)]
	capabilities: Vec<Value>,
}

#[derive(Deserialize)]
struct RawAttribute {
	name: String,
	#[serde(rename = "currentValue", default = "AttributeValue::null")]
	current_value: AttributeValue,
}

#[derive(Deserialize)]
struct RawDeviceDetail {
	#[serde(default)]
	attributes: Vec<RawAttribute>,
}

impl AttributeValue {
	fn null() -> Self {
		Self::Null
	}
}

pub(crate) fn string_or_int<'de, D>(deserializer: D) -> Result<DeviceId, D::Error>
where
	D: serde::Deserializer<'de>,
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

struct DeviceSubscription {
	attributes: HashSet<String>,
	callback: EventCallback,
}

/// Wrapper around the hub's REST API and its event push.
///
/// At most one callback is retained per device; a subsequent subscribe
/// replaces both the callback and the attribute filter.
pub struct HubClient {
	address: String,
	token: String,
	http: reqwest::Client,
	devices: RwLock<Vec<HubDevice>>,
	subscriptions: RwLock<HashMap<DeviceId, DeviceSubscription>>,
}

impl HubClient {
	pub fn new(hub_address: &str, app_id: &str, access_token: &str) -> Self {
		Self {
			address: format!("http://{hub_address}/apps/api/{app_id}"),
			token: access_token.to_string(),
			http: reqwest::Client::new(),
			devices: RwLock::new(Vec::new()),
			subscriptions: RwLock::new(HashMap::new()),
		}
	}

	/// Load the full device inventory, keeping only catalog capabilities.
	///
	/// Called once at startup, before the event ingress goes live.
	pub async fn load_devices(&self) -> Result<Vec<HubDevice>, HubError> {
		let resp = self.http.get(format!("{}/devices/all", self.address)).query(&[("access_token", &self.token)]).send().await?;
		let body = Self::check_status(resp).await?;
		let raw: Vec<RawDevice> = serde_json::from_str(&body)?;

		let mut devices = Vec::with_capacity(raw.len());
		for dev in raw {
			let caps: Vec<Capability> = dev.capabilities.iter().filter_map(Value::as_str).filter_map(Capability::from_name).collect();
			devices.push(HubDevice::new(dev.id, dev.label, dev.room, caps));
		}
		info!("loaded {} devices from the hub", devices.len());

		*self.devices.write().await = devices.clone();
		Ok(devices)
	}

	pub async fn devices(&self) -> Vec<HubDevice> {
		self.devices.read().await.clone()
	}

	/// Send a command (with optional arguments) to a device.
	pub async fn send_command(&self, device_id: DeviceId, command: &str, arguments: Option<&[AttributeValue]>) -> Result<(), HubError> {
		let mut url = format!("{}/devices/{device_id}/{command}", self.address);
		if let Some(args) = arguments {
			if !args.is_empty() {
				let joined = args.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
				url = format!("{url}/{joined}");
			}
		}
		debug!(device_id, command, "sending device command");

		let resp = self.http.get(url).query(&[("access_token", &self.token)]).send().await?;
		Self::check_status(resp).await?;
		Ok(())
	}

	/// Snapshot the current value of a single device attribute.
	pub async fn get_attribute(&self, device_id: DeviceId, attribute: &str) -> Result<AttributeValue, HubError> {
		let url = format!("{}/devices/{device_id}", self.address);
		let resp = self.http.get(url).query(&[("access_token", &self.token)]).send().await?;
		let body = Self::check_status(resp).await?;
		let detail: RawDeviceDetail = serde_json::from_str(&body)?;

		Ok(detail.attributes.into_iter().find(|a| a.name == attribute).map_or(AttributeValue::Null, |a| a.current_value))
	}

	/// Register `callback` for events on the given device attributes.
	///
	/// Replaces any previous subscription for the device.
	pub async fn subscribe(&self, device_id: DeviceId, attributes: Vec<String>, callback: EventCallback) {
		let subscription = DeviceSubscription {
			attributes: attributes.into_iter().collect(),
			callback,
		};
		self.subscriptions.write().await.insert(device_id, subscription);
	}

	/// Drop any subscription for the given device.
	pub async fn unsubscribe(&self, device_id: DeviceId) {
		self.subscriptions.write().await.remove(&device_id);
	}

	/// Dispatch a raw event payload from the ingress to any subscriber.
	///
	/// Returns whether a callback was invoked.
	pub async fn handle_device_event(&self, payload: &Value) -> Result<bool, HubError> {
		let event: DeviceEvent = serde_json::from_value(payload.clone())?;
		info!(device_id = event.device_id, attribute = %event.attribute, value = %event.value, "device event");

		let callback = {
			let subscriptions = self.subscriptions.read().await;
			match subscriptions.get(&event.device_id) {
				Some(sub) if sub.attributes.contains(&event.attribute) => Some(sub.callback.clone()),
				Some(_) => None,
				None => {
					debug!(device_id = event.device_id, "event for device without subscribers");
					None
				}
			}
		};

		match callback {
			Some(cb) => {
				cb(event).await;
				Ok(true)
			}
			None => Ok(false),
		}
	}

	async fn check_status(resp: reqwest::Response) -> Result<String, HubError> {
		let status = resp.status();
		let body = resp.text().await.unwrap_or_default();
		if !status.is_success() {
			warn!(status = status.as_u16(), "hub request failed");
			return Err(HubError::Status { status: status.as_u16(), body });
		}
		Ok(body)
	}
}
