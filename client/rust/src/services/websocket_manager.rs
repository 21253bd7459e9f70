/// WebSocket connection manager for real-time envelope delivery.
/// Owns the transport lifecycle in a supervisor task: dials, forwards frames
/// in both directions, and reconnects with linear backoff until the
/// controller gives up or the caller tears the connection down.
use crate::error::{ClientError, Result};
use crate::models::{OutgoingEnvelope, ServerFrame};
use crate::reconnect::{ConnectionState, ReconnectController, ReconnectPolicy, Transition};
use crate::websocket::{Dialer, Transport, TransportEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Why a live session ended
enum SessionEnd {
    Lost,
    Superseded,
    Teardown,
}

pub struct WebSocketManager {
    outgoing: mpsc::UnboundedSender<String>,
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketManager {
    /// Spawn the supervisor and begin connecting.
    /// Returns the manager and the stream of frames pushed by the server.
    pub fn start(
        dialer: Arc<dyn Dialer>,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<ServerFrame>) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(supervise(
            dialer,
            ReconnectController::new(policy),
            outgoing_rx,
            incoming_tx,
            state_tx,
            shutdown_rx,
        ));

        let manager = WebSocketManager {
            outgoing: outgoing_tx,
            state: state_rx,
            shutdown: shutdown_tx,
            task: Some(task),
        };
        (manager, incoming_rx)
    }

    /// Queue an envelope on the live connection
    pub fn send(&self, envelope: &OutgoingEnvelope) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(ClientError::StateError(format!(
                "WebSocket not connected ({})",
                state
            )));
        }

        let json = serde_json::to_string(envelope)?;
        self.outgoing
            .send(json)
            .map_err(|e| ClientError::WebSocketError(format!("Failed to queue message: {}", e)))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state changes, `Failed` included
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Intentional teardown. Cancels any pending reconnection and waits for
    /// the supervisor to finish.
    pub async fn shutdown(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("WebSocket supervisor panicked: {}", e);
            }
        }
    }
}

impl Drop for WebSocketManager {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn supervise(
    dialer: Arc<dyn Dialer>,
    mut controller: ReconnectController,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    incoming: mpsc::UnboundedSender<ServerFrame>,
    state: watch::Sender<ConnectionState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let publish = |controller: &ReconnectController| {
        state.send_replace(controller.state());
    };

    if let Err(e) = controller.begin_connect() {
        log::error!("{}", e);
        return;
    }
    publish(&controller);

    loop {
        let dialed = tokio::select! {
            result = dialer.dial() => result,
            _ = shutdown.changed() => {
                controller.on_teardown();
                publish(&controller);
                return;
            }
        };

        match dialed {
            Ok(mut transport) => {
                controller.on_open();
                publish(&controller);
                log::info!("WebSocket connected");

                match run_session(transport.as_mut(), &mut outgoing, &incoming, &mut shutdown).await
                {
                    SessionEnd::Teardown => {
                        transport.close().await;
                        controller.on_teardown();
                        publish(&controller);
                        log::info!("WebSocket closed");
                        return;
                    }
                    SessionEnd::Superseded => {
                        // another session for this identity took over
                        controller.on_teardown();
                        publish(&controller);
                        log::warn!("Session superseded by a newer connection");
                        return;
                    }
                    SessionEnd::Lost => log::warn!("WebSocket connection lost"),
                }
            }
            Err(e) => log::warn!("WebSocket connection attempt failed: {}", e),
        }

        match controller.on_unexpected_close() {
            Transition::Retry { attempt, delay } => {
                publish(&controller);
                log::warn!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    delay,
                    attempt,
                    controller.policy().max_attempts
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        controller.on_retry_due();
                        publish(&controller);
                    }
                    _ = shutdown.changed() => {
                        controller.on_teardown();
                        publish(&controller);
                        return;
                    }
                }
            }
            Transition::Exhausted => {
                publish(&controller);
                log::error!(
                    "Giving up after {} reconnection attempts",
                    controller.policy().max_attempts
                );
                return;
            }
            Transition::Ignored => return,
        }
    }
}

async fn run_session(
    transport: &mut dyn Transport,
    outgoing: &mut mpsc::UnboundedReceiver<String>,
    incoming: &mpsc::UnboundedSender<ServerFrame>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    loop {
        tokio::select! {
            event = transport.next_event() => match event {
                TransportEvent::Text(text) => match serde_json::from_str::<ServerFrame>(&text) {
                    Ok(frame) => {
                        if incoming.send(frame).is_err() {
                            log::debug!("No listener for incoming frames");
                        }
                    }
                    Err(e) => log::warn!("Ignoring unrecognised frame: {}", e),
                },
                TransportEvent::Closed { superseded: true } => return SessionEnd::Superseded,
                TransportEvent::Closed { superseded: false } => return SessionEnd::Lost,
            },
            Some(text) = outgoing.recv() => {
                if let Err(e) = transport.send_text(text).await {
                    log::warn!("Failed to send WebSocket message: {}", e);
                    return SessionEnd::Lost;
                }
            }
            _ = shutdown.changed() => return SessionEnd::Teardown,
        }
    }
}
