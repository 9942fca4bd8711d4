use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "hearthd")]
#[command(about = "Home automation rule and scene engine", long_about = None)]
pub struct Config {
	/// Hub address (host:port)
	#[arg(long, env = "HE_ADDRESS")]
	pub he_address: String,

	/// Maker API app id on the hub
	#[arg(long, env = "HE_APP_ID")]
	pub he_app_id: String,

	/// Maker API access token
	#[arg(long, env = "HE_ACCESS_TOKEN")]
	pub he_access_token: String,

	/// API key for the assistant harness
	#[arg(long, env = "LLM_API_KEY")]
	pub llm_api_key: Option<String>,

	/// Model the assistant harness should use
	#[arg(long, env = "LLM_MODEL", default_value = "gpt-4o")]
	pub llm_model: String,

	/// Home location used in assistant prompts
	#[arg(long, env = "HOME_LOCATION")]
	pub home_location: Option<String>,

	/// Path to the home layout document used in assistant prompts
	#[arg(long, env = "HOME_LAYOUT")]
	pub home_layout: Option<String>,

	/// Where installed rules are persisted
	#[arg(long, env = "RULES_FILE", default_value = "rules.json")]
	pub rules_file: String,

	/// Where scenes are persisted
	#[arg(long, env = "SCENES_FILE", default_value = "scenes.json")]
	pub scenes_file: String,

	/// Address the event ingress listens on
	#[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
	pub listen_addr: String,
}
