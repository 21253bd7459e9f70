/// HTTP handlers module
/// Provides REST and WebSocket endpoints

pub mod rest;
pub mod websocket;

pub use rest::{get_history, health, send_envelope};
pub use websocket::{ws_connect, ChatServer};
