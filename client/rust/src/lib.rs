/// Secure Chat Client Library
/// Encrypted envelope messaging over a reconnecting WebSocket

pub mod api;
pub mod cli;
pub mod client;
pub mod crypto;
pub mod error;
pub mod models;
pub mod reconnect;
pub mod services;
pub mod websocket;

pub use client::{ChatClient, ClientConfig};
pub use error::{ClientError, Result};
pub use reconnect::{ConnectionState, ReconnectPolicy};
