/// Secure Chat Server - encrypted envelope relay
///
/// Main server entry point. Handles:
/// - Command-line argument parsing
/// - Database initialization
/// - HTTP and WebSocket server startup
use actix_web::web;
use secure_chat_server::auth::Authenticator;
use secure_chat_server::config::Config;
use secure_chat_server::handlers::ChatServer;
use secure_chat_server::server;
use secure_chat_server::store::SqliteStore;
use std::fs;
use std::process;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let config = Config::from_args();

    log::info!("Starting Secure Chat Server");
    log::info!("Database: {:?}", config.database);
    log::info!("Port: {}", config.port);
    log::info!("Evict superseded sessions: {}", config.evict_superseded);

    // Write PID file if specified
    if let Some(pidfile) = &config.pidfile {
        let pid = process::id().to_string();
        fs::write(pidfile, pid)?;
        log::info!("PID file written to: {:?}", pidfile);
    }

    let db_path = config
        .database
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Database path is not valid UTF-8"))?;
    let store = Arc::new(SqliteStore::open(db_path)?);

    log::info!("Database initialized");

    let chat_server = web::Data::new(
        ChatServer::new(Authenticator::new(&config.jwt_secret), store)
            .with_eviction(config.evict_superseded),
    );

    let bind_addr = config.bind_addr();
    log::info!("Starting HTTP server on {}", bind_addr);

    server::create_http_server(chat_server, &bind_addr)?.await?;
    Ok(())
}
