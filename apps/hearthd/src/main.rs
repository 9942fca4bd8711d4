mod config;
mod http;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hub_client::HubClient;
use rule_engine::{HubInterface, RuleManager, RuleProcessManager, SceneManager};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::http::ApiContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	dotenv::dotenv().ok();
	tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

	let config = Config::parse();

	let hub = Arc::new(HubClient::new(&config.he_address, &config.he_app_id, &config.he_access_token));
	let devices = hub.load_devices().await.context("could not load devices from the hub")?;
	info!(devices = devices.len(), "hub inventory loaded");

	let hub_dyn: Arc<dyn HubInterface> = hub.clone();
	let process = RuleProcessManager::new(hub_dyn.clone());
	let scenes = SceneManager::new(hub_dyn.clone(), process.clone(), PathBuf::from(&config.scenes_file));
	let rules = RuleManager::new(process, hub_dyn, scenes.clone(), PathBuf::from(&config.rules_file));

	// Scenes first: rule actions may reference them.
	scenes.install_saved_scenes().await.context("could not reinstall saved scenes")?;
	rules.install_saved_rules().await.context("could not reinstall saved rules")?;

	let tools: HashMap<&'static str, _> = assistant_tools::toolset(rules, scenes).into_iter().map(|t| (t.name(), t)).collect();
	let context = ApiContext {
		hub,
		tools: Arc::new(tools),
	};

	let listener = TcpListener::bind(&config.listen_addr).await.with_context(|| format!("could not bind {}", config.listen_addr))?;
	info!(addr = %config.listen_addr, "event ingress listening");
	axum::serve(listener, http::router(context)).await?;

	Ok(())
}
