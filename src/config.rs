use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// chatd — real-time chat backend
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "chatd", version, about = "Real-time chat backend")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "CHATD_PORT", default_value = "3000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "CHATD_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./chatd.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "CHATD_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (snapshot, JWT key)
    #[arg(long, env = "CHATD_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Interval in seconds between duplicate-user sweeps
    #[arg(long, env = "CHATD_DEDUP_INTERVAL_SECS", default_value = "60")]
    pub dedup_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            config: "./chatd.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            dedup_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (CHATD_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("CHATD_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# chatd configuration
# Place this file at ./chatd.toml or specify with --config <path>
# All settings can be overridden via environment variables (CHATD_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the JSON snapshot and JWT signing key
# data_dir = "./data"

# Interval in seconds between duplicate-user sweeps (default: 60)
# dedup_interval_secs = 60
"#
    .to_string()
}
