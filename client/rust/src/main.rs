/// Secure Chat Client - Main entry point
///
/// A command-line client that exchanges encrypted envelopes through the relay
use clap::Parser;
use log::info;
use secure_chat_client::client::{ChatClient, ClientConfig};
use secure_chat_client::reconnect::ReconnectPolicy;
use secure_chat_client::cli;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "secure-chat")]
#[command(about = "Secure Chat Client - Encrypted one-to-one messaging")]
struct Args {
    /// Server URL
    #[arg(long, default_value = "http://localhost:5000")]
    server: String,

    /// Signed credential issued by the login service
    #[arg(long, env = "CHAT_TOKEN", hide_env_values = true)]
    token: String,

    /// 32-byte message key as hex (defaults to the shared demo key)
    #[arg(long, env = "CHAT_KEY_HEX", hide_env_values = true)]
    key_hex: Option<String>,

    /// Conversation partner to open on start
    #[arg(long)]
    peer: Option<String>,

    /// Base reconnection delay in milliseconds
    #[arg(long, default_value_t = 1000)]
    base_delay_ms: u64,

    /// Enable verbose logging (DEBUG level)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    info!("Starting Secure Chat Client");
    info!("Server: {}", args.server);

    let config = ClientConfig {
        server_url: args.server,
        token: args.token,
        key_hex: args.key_hex,
        policy: ReconnectPolicy {
            base_delay: Duration::from_millis(args.base_delay_ms),
            ..ReconnectPolicy::default()
        },
    };

    let (mut client, mut incoming) = ChatClient::connect(config)?;
    if let Some(peer) = &args.peer {
        client.set_peer(peer);
    }

    cli::run_client_loop(&mut client, &mut incoming).await?;
    Ok(())
}
