/// WebSocket handler for real-time envelope relay.
/// Authenticates the upgrade request, registers the session and feeds every
/// inbound frame through the relay in arrival order.
use crate::auth::{Authenticator, Identity};
use crate::error::RelayError;
use crate::registry::{Outbound, SessionHandle, SessionRegistry};
use crate::relay::EnvelopeRelay;
use crate::store::OfflineStore;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared server state - authenticator, registry and relay
pub struct ChatServer {
    pub authenticator: Authenticator,
    pub relay: EnvelopeRelay,
    pub evict_superseded: bool,
}

impl ChatServer {
    pub fn new(authenticator: Authenticator, store: Arc<dyn OfflineStore>) -> Self {
        ChatServer {
            authenticator,
            relay: EnvelopeRelay::new(Arc::new(SessionRegistry::new()), store),
            evict_superseded: true,
        }
    }

    pub fn with_eviction(mut self, evict_superseded: bool) -> Self {
        self.evict_superseded = evict_superseded;
        self
    }

    /// Register a new session, closing the one it replaces
    pub async fn connect_session(&self, identity: Identity, handle: SessionHandle) {
        let previous = self.relay.registry().register(identity.clone(), handle).await;

        if let Some(previous) = previous {
            if self.evict_superseded {
                log::info!(
                    "{} reconnected, closing superseded session {}",
                    identity,
                    previous.session_id
                );
                let _ = previous.send(Outbound::Superseded);
            } else {
                log::info!(
                    "{} reconnected, previous session {} no longer routed",
                    identity,
                    previous.session_id
                );
            }
        }
    }

    /// Remove the session if it is still the registered one
    pub async fn disconnect_session(&self, identity: &Identity, session_id: Uuid) {
        if !self.relay.registry().unregister(identity, session_id).await {
            log::debug!("Session {} for {} already replaced", session_id, identity);
        }
    }
}

/// WebSocket actor for individual client connections
pub struct WsActor {
    pub identity: Identity,
    pub session_id: Uuid,
    pub server: web::Data<ChatServer>,
}

impl WsActor {
    pub fn new(identity: Identity, server: web::Data<ChatServer>) -> Self {
        WsActor {
            identity,
            session_id: Uuid::nil(),
            server,
        }
    }
}

impl Actor for WsActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = SessionHandle::new(tx);
        self.session_id = handle.session_id;
        log::info!("{} connected (session {})", self.identity, self.session_id);

        let addr = ctx.address();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if !addr.connected() {
                    break;
                }
                addr.do_send(Deliver(frame));
            }
        });

        // No inbound frame is processed before the session is routable
        let server = self.server.clone();
        let identity = self.identity.clone();
        ctx.wait(
            async move {
                server.connect_session(identity, handle).await;
            }
            .into_actor(self),
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::info!("{} disconnected (session {})", self.identity, self.session_id);
        let server = self.server.clone();
        let identity = self.identity.clone();
        let session_id = self.session_id;
        actix::spawn(async move {
            server.disconnect_session(&identity, session_id).await;
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                let server = self.server.clone();
                let identity = self.identity.clone();
                let payload = text.to_string();
                // wait() keeps this connection's envelopes in arrival order
                ctx.wait(
                    async move { server.relay.handle_inbound(&identity, &payload).await }
                        .into_actor(self)
                        .map(|result, _act, ctx| {
                            if let Err(RelayError::PersistenceFailure(_)) = result {
                                ctx.text(json!({ "error": "message could not be stored" }).to_string());
                            }
                        }),
                );
            }
            Ok(ws::Message::Ping(bytes)) => ctx.pong(&bytes),
            Ok(ws::Message::Binary(_)) => {
                log::warn!("Ignoring binary frame from {}", self.identity);
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                log::error!("WebSocket error for {}: {}", self.identity, e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct Deliver(Outbound);

impl Handler<Deliver> for WsActor {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        match msg.0 {
            Outbound::Envelope(text) => ctx.text(text),
            Outbound::Superseded => {
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Policy,
                    description: Some("superseded".to_string()),
                }));
                ctx.stop();
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// WebSocket connection handler
/// GET /ws?token=...
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<ConnectQuery>,
    server: web::Data<ChatServer>,
) -> actix_web::Result<HttpResponse> {
    let identity = match server.authenticator.authenticate(query.token.as_deref()) {
        Ok(identity) => identity,
        Err(e) => {
            log::warn!("WebSocket authentication error: {}", e);
            return Err(e.into());
        }
    };

    let actor = WsActor::new(identity, server.clone());
    let resp = ws::start(actor, &req, stream)?;
    Ok(resp)
}
