use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;

pub type DeviceId = u32;

/// A device known to the hub, filtered down to the capability catalog.
///
/// Devices are immutable for the lifetime of a run; the inventory is loaded
/// once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubDevice {
	pub id: DeviceId,
	pub label: String,
	pub room: String,
	pub capabilities: Vec<Capability>,
	/// Attribute names derived from `capabilities`.
	pub attributes: BTreeSet<String>,
	/// Command names derived from `capabilities`.
	pub commands: BTreeSet<String>,
}

impl HubDevice {
	pub fn new(id: DeviceId, label: String, room: String, capabilities: Vec<Capability>) -> Self {
		let attributes = capabilities.iter().flat_map(|c| c.attributes()).map(|a| a.name.to_string()).collect();
		let commands = capabilities.iter().flat_map(|c| c.commands()).map(|c| c.name.to_string()).collect();
		Self {
			id,
			label,
			room,
			capabilities,
			attributes,
			commands,
		}
	}

	pub fn has_attribute(&self, name: &str) -> bool {
		self.attributes.contains(name)
	}

	pub fn has_command(&self, name: &str) -> bool {
		self.commands.contains(name)
	}
}
