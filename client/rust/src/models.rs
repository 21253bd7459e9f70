//! Wire models and CLI commands for the chat client

use serde::{Deserialize, Serialize};

/// Client -> server envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutgoingEnvelope {
    pub receiver: String,
    pub ciphertext: String,
    pub iv: String,
}

/// Server -> receiver envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomingEnvelope {
    pub sender: String,
    pub ciphertext: String,
    pub iv: String,
}

/// Anything the server pushes over the WebSocket
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ServerFrame {
    Envelope(IncomingEnvelope),
    Error { error: String },
}

/// Stored envelope returned by the history endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub sender: String,
    pub receiver: String,
    pub ciphertext: String,
    pub iv: String,
    pub timestamp: i64,
}

/// Decrypted message ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
}

/// Command types for CLI
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Switch the conversation partner
    To(String),
    History,
    Message(String),
    Quit,
}

impl Command {
    /// Parse a command string
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();

        if input == "/quit" || input == "/exit" {
            return Ok(Command::Quit);
        }

        if input == "/history" {
            return Ok(Command::History);
        }

        if input == "/to" {
            return Err("Usage: /to <username>".to_string());
        }

        if let Some(peer) = input.strip_prefix("/to ") {
            let peer = peer.trim();
            if peer.is_empty() {
                return Err("Usage: /to <username>".to_string());
            }
            return Ok(Command::To(peer.to_string()));
        }

        if input.starts_with('/') {
            return Err(format!("Unknown command: {}", input));
        }

        Ok(Command::Message(input.to_string()))
    }
}
