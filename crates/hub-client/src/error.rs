use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
	#[error("hub request failed: {0}")]
	Http(#[from] reqwest::Error),
	#[error("hub returned '{status}' status: {body}")]
	Status { status: u16, body: String },
	#[error("malformed hub payload: {0}")]
	Payload(#[from] serde_json::Error),
	#[error("no device with id {0}")]
	UnknownDevice(u32),
}
