use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use anyhow::{bail, Context, Result};
use ws_relay::ServerMode;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            transport: TransportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub listen_host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// One of `open_url`, `forced_url`, `forced_url_no_password`.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Required when `mode` is `forced_url` or `forced_url_no_password`.
    #[serde(default)]
    pub forced_destination: String,
    #[serde(default = "default_max_messages")]
    pub max_messages_per_session: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_host: default_host(),
            port: default_port(),
            mode: default_mode(),
            forced_destination: String::new(),
            max_messages_per_session: default_max_messages(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthConfig {
    /// Expected client password. Empty still requires the client to send an
    /// empty password field.
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub send_prefix: String,
    #[serde(default)]
    pub send_suffix: String,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_session_log_path")]
    pub session_log_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            session_log_path: default_session_log_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1111
}

fn default_mode() -> String {
    "open_url".to_string()
}

fn default_max_messages() -> u32 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_session_log_path() -> PathBuf {
    PathBuf::from("sessions.jsonl")
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// If the file does not exist a default configuration is returned and a
/// warning is emitted. Anything else that goes wrong (unreadable file,
/// invalid YAML) is an error.
pub fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    load_from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}

/// Parse a [`Config`] from YAML text. Primary entry point for tests.
pub fn load_from_str(yaml: &str) -> Result<Config> {
    let config: Config = serde_yml::from_str(yaml).context("YAML deserialization failed")?;
    Ok(config)
}

/// Check mode-dependent invariants and produce the typed [`ServerMode`].
///
/// Runs before the listener binds: an invalid mode string, a forced mode
/// without a destination, or a zero message quota refuses to start, so no
/// session is ever accepted under a partially valid configuration.
pub fn validate(config: &Config) -> Result<ServerMode> {
    if config.server.max_messages_per_session == 0 {
        bail!("max_messages_per_session must be a positive integer");
    }

    match config.server.mode.as_str() {
        "open_url" => Ok(ServerMode::OpenUrl),
        mode @ ("forced_url" | "forced_url_no_password") => {
            if config.server.forced_destination.is_empty() {
                bail!(
                    "forced destination url in config is missing; \
                     it is required when running in '{mode}' mode"
                );
            }
            let destination = config.server.forced_destination.clone();
            if mode == "forced_url" {
                Ok(ServerMode::ForcedUrl { destination })
            } else {
                Ok(ServerMode::ForcedUrlNoPassword { destination })
            }
        }
        other => bail!("server mode value '{other}' in config is invalid"),
    }
}
