use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ws-relayd", version, about = "Authenticating WebSocket relay daemon")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Listen host (overrides config file setting)
    #[arg(long)]
    pub listen_host: Option<String>,

    /// Listen port (overrides config file setting)
    #[arg(long)]
    pub port: Option<u16>,

    /// Session log path (overrides config file setting)
    #[arg(long)]
    pub session_log: Option<PathBuf>,
}
