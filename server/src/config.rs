/// Configuration management for the relay server.
/// Handles command-line argument parsing and config structure.
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "Secure Chat Server")]
#[command(about = "Encrypted envelope relay with offline history", long_about = None)]
pub struct Config {
    /// Server port (default: 5000)
    #[arg(long, default_value = "5000")]
    pub port: u16,

    /// Interface to bind (default: 127.0.0.1)
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,

    /// SQLite database file path (default: securechat.db)
    #[arg(long, default_value = "securechat.db")]
    pub database: PathBuf,

    /// PID file path (optional) - write server PID to this file on startup
    #[arg(long)]
    pub pidfile: Option<PathBuf>,

    /// Shared secret used to verify connection tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Close the older session when an identity connects a second time
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub evict_superseded: bool,
}

impl Config {
    /// Parse command-line arguments into Config
    pub fn from_args() -> Self {
        Config::parse()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
