//! Client for the hub's Maker-style REST API.
//!
//! Exposes the device inventory (filtered through a fixed capability
//! catalog), command sends, attribute snapshots, and per-device event
//! subscriptions that the rule engine drives its reactive graph from.

pub mod capability;
pub mod client;
pub mod device;
pub mod error;
pub mod event;
pub mod value;

pub use capability::{AttributeSchema, Capability, CommandArgument, CommandSchema};
pub use client::HubClient;
pub use device::{DeviceId, HubDevice};
pub use error::HubError;
pub use event::{DeviceEvent, EventCallback};
pub use value::AttributeValue;
