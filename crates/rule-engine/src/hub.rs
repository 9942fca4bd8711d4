use async_trait::async_trait;
use hub_client::{AttributeValue, DeviceId, EventCallback, HubClient, HubError};

/// The seam between the engine and the hub adapter.
///
/// The production implementation is [`HubClient`]; tests drive the engine
/// through scripted in-memory fakes.
#[async_trait]
pub trait HubInterface: Send + Sync {
	async fn send_command(&self, device_id: DeviceId, command: &str, arguments: Option<&[AttributeValue]>) -> Result<(), HubError>;

	async fn get_attribute(&self, device_id: DeviceId, attribute: &str) -> Result<AttributeValue, HubError>;

	/// Register `callback` for events on the given attributes, replacing any
	/// previous subscription for the device.
	async fn subscribe(&self, device_id: DeviceId, attributes: Vec<String>, callback: EventCallback);

	async fn unsubscribe(&self, device_id: DeviceId);
}

#[async_trait]
impl HubInterface for HubClient {
	async fn send_command(&self, device_id: DeviceId, command: &str, arguments: Option<&[AttributeValue]>) -> Result<(), HubError> {
		Self::send_command(self, device_id, command, arguments).await
	}

	async fn get_attribute(&self, device_id: DeviceId, attribute: &str) -> Result<AttributeValue, HubError> {
		Self::get_attribute(self, device_id, attribute).await
	}

	async fn subscribe(&self, device_id: DeviceId, attributes: Vec<String>, callback: EventCallback) {
		Self::subscribe(self, device_id, attributes, callback).await;
	}

	async fn unsubscribe(&self, device_id: DeviceId) {
		Self::unsubscribe(self, device_id).await;
	}
}
