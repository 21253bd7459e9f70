/// Chat client orchestrator
///
/// Ties together the sealer, the history API and the WebSocket manager for a
/// single signed-in identity talking to one peer at a time.
use crate::api::HistoryApi;
use crate::crypto::{KeyProvider, Sealer, StaticKeyProvider};
use crate::error::{ClientError, Result};
use crate::models::{ChatMessage, HistoryEntry, IncomingEnvelope, OutgoingEnvelope, ServerFrame};
use crate::reconnect::{ConnectionState, ReconnectPolicy};
use crate::services::WebSocketManager;
use crate::websocket::{Dialer, WsDialer};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Everything needed to bring a client up
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub token: String,
    /// Hex key; the shared placeholder key when absent
    pub key_hex: Option<String>,
    pub policy: ReconnectPolicy,
}

pub struct ChatClient {
    peer: Option<String>,
    policy: ReconnectPolicy,
    sealer: Sealer,
    api: HistoryApi,
    connection: WebSocketManager,
}

impl ChatClient {
    /// Start connecting over a real WebSocket.
    /// Returns the client and the stream of server frames.
    pub fn connect(config: ClientConfig) -> Result<(Self, mpsc::UnboundedReceiver<ServerFrame>)> {
        let dialer = Arc::new(WsDialer::new(&config.server_url, &config.token)?);
        let keys: Arc<dyn KeyProvider> = match &config.key_hex {
            Some(key_hex) => Arc::new(StaticKeyProvider::from_hex(key_hex)?),
            None => Arc::new(StaticKeyProvider::placeholder()?),
        };
        Self::with_parts(config, dialer, keys)
    }

    /// Start with an explicit dialer and key source
    pub fn with_parts(
        config: ClientConfig,
        dialer: Arc<dyn Dialer>,
        keys: Arc<dyn KeyProvider>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerFrame>)> {
        let api = HistoryApi::new(&config.server_url, &config.token)?;
        let (connection, incoming) = WebSocketManager::start(dialer, config.policy);

        let client = ChatClient {
            peer: None,
            policy: config.policy,
            sealer: Sealer::new(keys),
            api,
            connection,
        };
        Ok((client, incoming))
    }

    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    pub fn set_peer(&mut self, peer: &str) {
        log::info!("Now talking to {}", peer);
        self.peer = Some(peer.to_string());
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Seal `text` for the current peer and send it
    pub fn send_message(&self, text: &str) -> Result<()> {
        let peer = self
            .peer
            .as_deref()
            .ok_or_else(|| ClientError::StateError("No recipient selected. Use /to <username>".to_string()))?;

        let (ciphertext, iv) = self.sealer.seal(peer, text)?;
        self.connection.send(&OutgoingEnvelope {
            receiver: peer.to_string(),
            ciphertext,
            iv,
        })
    }

    /// Decrypt a pushed envelope. Undecryptable content is replaced with a
    /// notice instead of failing.
    pub fn open_incoming(&self, envelope: &IncomingEnvelope) -> ChatMessage {
        ChatMessage {
            sender: envelope.sender.clone(),
            content: self.open_or_notice(&envelope.sender, &envelope.ciphertext, &envelope.iv),
        }
    }

    /// Stored conversation with the current peer, decrypted, oldest first
    pub async fn history(&self) -> Result<Vec<ChatMessage>> {
        let peer = self
            .peer
            .as_deref()
            .ok_or_else(|| ClientError::StateError("No recipient selected. Use /to <username>".to_string()))?;

        let entries = self.api.fetch_history(peer).await?;
        Ok(entries
            .iter()
            .map(|entry| self.open_entry(peer, entry))
            .collect())
    }

    fn open_entry(&self, peer: &str, entry: &HistoryEntry) -> ChatMessage {
        ChatMessage {
            sender: entry.sender.clone(),
            content: self.open_or_notice(peer, &entry.ciphertext, &entry.iv),
        }
    }

    fn open_or_notice(&self, peer: &str, ciphertext: &str, iv: &str) -> String {
        match self.sealer.open(peer, ciphertext, iv) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                log::warn!("Could not decrypt envelope from {}: {}", peer, e);
                format!("[could not decrypt message: {}]", e)
            }
        }
    }

    /// Whether the server's HTTP side answers
    pub async fn check_server(&self) -> Result<()> {
        self.api.health_check().await
    }

    /// Intentional teardown; no reconnection follows
    pub async fn shutdown(&mut self) {
        self.connection.shutdown().await;
    }
}
