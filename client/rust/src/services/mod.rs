/// Service layer for the chat client.
/// Long-running background work that sits behind `ChatClient`.

pub mod websocket_manager;

pub use websocket_manager::WebSocketManager;
