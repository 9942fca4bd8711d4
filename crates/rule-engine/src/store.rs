//! JSON-document persistence for the declarative models.
//!
//! Rules and scenes are each one JSON array on disk; every mutation rewrites
//! the whole file and a missing file reads back as the empty list.

use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::EngineError;

pub async fn save_models<T: Serialize>(path: &Path, models: &[T]) -> Result<(), EngineError> {
	let body = serde_json::to_vec_pretty(models)?;
	tokio::fs::write(path, body).await?;
	debug!(path = %path.display(), count = models.len(), "persisted models");
	Ok(())
}

pub async fn load_models<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, EngineError> {
	let raw = match tokio::fs::read(path).await {
		Ok(raw) => raw,
		Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
		Err(err) => return Err(err.into()),
	};
	Ok(serde_json::from_slice(&raw)?)
}
