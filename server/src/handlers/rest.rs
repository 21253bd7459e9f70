/// REST API handlers for HTTP endpoints.
/// Handles history retrieval, the HTTP send path and health checks.
use crate::auth::Identity;
use crate::error::RelayError;
use crate::handlers::websocket::ChatServer;
use crate::store::models::{HealthResponse, SendEnvelopeResponse};
use actix_web::{http::header, web, HttpRequest, HttpResponse, Result as ActixResult};

/// Resolve the caller from an `Authorization: Bearer <token>` header
fn authorize(req: &HttpRequest, server: &ChatServer) -> Result<Identity, RelayError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start_matches("Bearer ").trim());

    server.authenticator.authenticate(token).map_err(|e| {
        log::warn!("Token verification error: {}", e);
        e
    })
}

/// Conversation between the caller and a peer, oldest first
/// GET /api/messages/{peer}
pub async fn get_history(
    req: HttpRequest,
    server: web::Data<ChatServer>,
    peer: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let caller = authorize(&req, &server)?;
    let peer = Identity::from(peer.into_inner());

    let envelopes = server.relay.history(&caller, &peer).await.map_err(|e| {
        log::error!("Get messages error: {}", e);
        e
    })?;

    Ok(HttpResponse::Ok().json(envelopes))
}

/// Send an envelope over HTTP instead of the WebSocket
/// POST /api/messages
///
/// The body is parsed by the relay itself so a malformed envelope gets the
/// same JSON error body as every other failure.
pub async fn send_envelope(
    req: HttpRequest,
    server: web::Data<ChatServer>,
    body: String,
) -> ActixResult<HttpResponse> {
    let sender = authorize(&req, &server)?;
    let outcome = server.relay.handle_inbound(&sender, &body).await?;

    let envelope = outcome.envelope();
    Ok(HttpResponse::Created().json(SendEnvelopeResponse {
        id: envelope.id,
        timestamp: envelope.timestamp,
        delivered: outcome.delivered(),
    }))
}

/// Health check endpoint
/// GET /health
pub async fn health(server: web::Data<ChatServer>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        online: server.relay.registry().online_count().await,
    }))
}
