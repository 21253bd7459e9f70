/// WebSocket transport for real-time envelope delivery
///
/// `Dialer` and `Transport` are the seam the connection manager drives;
/// `WsDialer` is the tokio-tungstenite implementation.
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// Close reason the server uses when a newer session replaces this one
pub const SUPERSEDED_REASON: &str = "superseded";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    Closed { superseded: bool },
}

/// One open connection
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next meaningful event. Errors and end-of-stream surface as `Closed`.
    async fn next_event(&mut self) -> TransportEvent;

    async fn close(&mut self);
}

/// Opens new transports
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self) -> Result<Box<dyn Transport>>;
}

/// Build the WebSocket endpoint URL from the server's HTTP base URL
pub fn ws_url(server_url: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(server_url)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::ConfigError(format!(
                "Unsupported URL scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::ConfigError("Cannot set WebSocket scheme".to_string()))?;
    url.set_path("/ws");
    url.query_pairs_mut().clear().append_pair("token", token);
    Ok(url)
}

pub struct WsDialer {
    url: Url,
}

impl WsDialer {
    pub fn new(server_url: &str, token: &str) -> Result<Self> {
        Ok(WsDialer {
            url: ws_url(server_url, token)?,
        })
    }
}

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self) -> Result<Box<dyn Transport>> {
        let (stream, _) = connect_async(self.url.as_str()).await?;
        log::debug!("WebSocket opened to {}{}", self.url.host_str().unwrap_or(""), self.url.path());
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Text(text.to_string()),
                Some(Ok(Message::Close(frame))) => {
                    let superseded = frame.is_some_and(|f| {
                        f.code == CloseCode::Policy && f.reason.as_str() == SUPERSEDED_REASON
                    });
                    return TransportEvent::Closed { superseded };
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    log::warn!("WebSocket error: {}", e);
                    return TransportEvent::Closed { superseded: false };
                }
                None => return TransportEvent::Closed { superseded: false },
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            log::debug!("Error closing WebSocket: {}", e);
        }
    }
}
