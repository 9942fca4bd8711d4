use hub_client::HubError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
	#[error("rule '{0}' is already installed")]
	DuplicateRule(String),
	#[error("scene '{0}' already exists")]
	DuplicateScene(String),
	#[error("scene '{0}' does not exist")]
	UnknownScene(String),
	#[error("boolean operator 'not' requires exactly one sub-condition, got {0}")]
	NotArity(usize),
	#[error("invalid time of day {hour:02}:{minute:02}")]
	InvalidTime { hour: u32, minute: u32 },
	#[error("hub error: {0}")]
	Hub(#[from] HubError),
	#[error("persistence error: {0}")]
	Io(#[from] std::io::Error),
	#[error("serialization error: {0}")]
	Json(#[from] serde_json::Error),
}
