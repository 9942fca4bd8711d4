//! Shared test harness: a scripted in-memory hub.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use hub_client::{AttributeValue, DeviceEvent, DeviceId, EventCallback, HubError};
use rule_engine::HubInterface;
use tokio::sync::Mutex;

/// A recorded device command.
pub type SentCommand = (DeviceId, String, Vec<AttributeValue>);

/// In-memory hub stand-in with scripted attribute state.
///
/// Tests preload attribute values, then push events through the same
/// subscription path the real hub uses.
#[derive(Default)]
pub struct FakeHub {
	attributes: Mutex<HashMap<(DeviceId, String), AttributeValue>>,
	commands: Mutex<Vec<SentCommand>>,
	subscriptions: Mutex<HashMap<DeviceId, (HashSet<String>, EventCallback)>>,
}

impl FakeHub {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub async fn set_attribute(&self, device_id: DeviceId, attribute: &str, value: AttributeValue) {
		self.attributes.lock().await.insert((device_id, attribute.to_string()), value);
	}

	/// Update the stored attribute and dispatch the event to any subscriber,
	/// exactly the way the hub's event push does.
	pub async fn fire_event(&self, device_id: DeviceId, attribute: &str, value: AttributeValue) {
		self.set_attribute(device_id, attribute, value.clone()).await;
		let callback = {
			let subscriptions = self.subscriptions.lock().await;
			subscriptions.get(&device_id).and_then(|(attrs, cb)| attrs.contains(attribute).then(|| cb.clone()))
		};
		if let Some(callback) = callback {
			callback(DeviceEvent {
				device_id,
				attribute: attribute.to_string(),
				value,
			})
			.await;
		}
	}

	pub async fn sent_commands(&self) -> Vec<SentCommand> {
		self.commands.lock().await.clone()
	}

	pub async fn subscription_count(&self) -> usize {
		self.subscriptions.lock().await.len()
	}

	pub async fn is_subscribed(&self, device_id: DeviceId, attribute: &str) -> bool {
		self.subscriptions.lock().await.get(&device_id).is_some_and(|(attrs, _)| attrs.contains(attribute))
	}
}

#[async_trait]
impl HubInterface for FakeHub {
	async fn send_command(&self, device_id: DeviceId, command: &str, arguments: Option<&[AttributeValue]>) -> Result<(), HubError> {
		self.commands.lock().await.push((device_id, command.to_string(), arguments.unwrap_or_default().to_vec()));
		Ok(())
	}

	async fn get_attribute(&self, device_id: DeviceId, attribute: &str) -> Result<AttributeValue, HubError> {
		Ok(self.attributes.lock().await.get(&(device_id, attribute.to_string())).cloned().unwrap_or(AttributeValue::Null))
	}

	async fn subscribe(&self, device_id: DeviceId, attributes: Vec<String>, callback: EventCallback) {
		self.subscriptions.lock().await.insert(device_id, (attributes.into_iter().collect(), callback));
	}

	async fn unsubscribe(&self, device_id: DeviceId) {
		self.subscriptions.lock().await.remove(&device_id);
	}
}
