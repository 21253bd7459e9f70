/// HTTP server factory and configuration.
/// Provides a reusable function to create and configure the HTTP server
/// for use in both the main binary and tests.
use crate::handlers::{get_history, health, send_envelope, ws_connect, ChatServer};
use actix_web::{middleware, web, App, HttpServer};

/// Shared secret used by `create_test_http_server`
#[cfg(any(test, feature = "test_utils"))]
pub const TEST_JWT_SECRET: &str = "test-jwt-secret";

/// Register every route on an app or test service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // REST endpoints
        .route("/health", web::get().to(health))
        .route("/api/messages", web::post().to(send_envelope))
        .route("/api/messages/{peer}", web::get().to(get_history))
        // WebSocket endpoint
        .route("/ws", web::get().to(ws_connect));
}

/// Create a configured HTTP server
///
/// Takes the shared chat state and a bind address, then returns a fully
/// configured `HttpServer` ready to be run.
///
/// # Example
/// ```ignore
/// let store = Arc::new(SqliteStore::open("securechat.db")?);
/// let chat = web::Data::new(ChatServer::new(Authenticator::new(secret), store));
/// let server = server::create_http_server(chat, "127.0.0.1:5000")?;
/// server.await?;
/// ```
pub fn create_http_server(
    chat_server: web::Data<ChatServer>,
    bind_addr: &str,
) -> std::io::Result<actix_web::dev::Server> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(chat_server.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(bind_addr)?
    .run();

    Ok(server)
}

/// Create a test HTTP server with an in-memory store
///
/// Binds to a random available port and verifies tokens with
/// `TEST_JWT_SECRET`.
///
/// # Returns
/// A tuple of (server, bind_address, shared state) so tests can issue tokens
/// and inspect the registry and store.
#[cfg(any(test, feature = "test_utils"))]
pub fn create_test_http_server(
) -> std::io::Result<(actix_web::dev::Server, String, web::Data<ChatServer>)> {
    use crate::auth::Authenticator;
    use crate::store::SqliteStore;
    use std::sync::Arc;

    let chat_server = web::Data::new(ChatServer::new(
        Authenticator::new(TEST_JWT_SECRET),
        Arc::new(SqliteStore::in_memory()),
    ));

    // Bind to 127.0.0.1:0 to get a random available port
    let state = chat_server.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .workers(1)
    .bind("127.0.0.1:0")?;

    let addr_str = server
        .addrs()
        .first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "No bind address found"))?
        .to_string();

    Ok((server.run(), addr_str, chat_server))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Authenticator, Identity};
    use crate::store::models::Envelope;
    use crate::store::SqliteStore;
    use actix_web::test;
    use std::sync::Arc;

    fn chat_state() -> web::Data<ChatServer> {
        web::Data::new(ChatServer::new(
            Authenticator::new(TEST_JWT_SECRET),
            Arc::new(SqliteStore::in_memory()),
        ))
    }

    fn bearer(name: &str) -> (&'static str, String) {
        let token = Authenticator::new(TEST_JWT_SECRET)
            .issue(&Identity::from(name), None)
            .unwrap();
        ("Authorization", format!("Bearer {}", token))
    }

    #[tokio::test]
    async fn test_create_http_server_with_test_store() {
        let result = create_http_server(chat_state(), "127.0.0.1:0");
        assert!(result.is_ok(), "create_http_server should succeed");
    }

    #[tokio::test]
    async fn test_create_http_server_invalid_address() {
        let result = create_http_server(chat_state(), "invalid_address:99999");
        assert!(result.is_err(), "create_http_server should fail with invalid address");
    }

    #[tokio::test]
    async fn test_create_test_http_server() {
        let (_server, addr, _state) =
            create_test_http_server().expect("create_test_http_server should succeed");
        assert!(addr.contains("127.0.0.1:"), "Address should contain 127.0.0.1:");
        let port_part = addr.split(':').nth(1).unwrap_or("");
        assert!(!port_part.is_empty(), "Port should be assigned");
    }

    #[actix_web::test]
    async fn test_health_endpoint() {
        let app = test::init_service(App::new().app_data(chat_state()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["status"], "ok");
        assert_eq!(resp["online"], 0);
    }

    #[actix_web::test]
    async fn test_history_requires_token() {
        let app = test::init_service(App::new().app_data(chat_state()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/messages/bob").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);

        let req = test::TestRequest::get()
            .uri("/api/messages/bob")
            .insert_header(("Authorization", "Bearer not-a-token"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn test_send_then_fetch_history() {
        let app = test::init_service(App::new().app_data(chat_state()).configure(configure)).await;

        for (sender, receiver, ciphertext) in [("alice", "bob", "t1"), ("bob", "alice", "t2"), ("alice", "bob", "t3")] {
            let req = test::TestRequest::post()
                .uri("/api/messages")
                .insert_header(bearer(sender))
                .set_json(serde_json::json!({
                    "receiver": receiver,
                    "ciphertext": ciphertext,
                    "iv": "00112233"
                }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 201);
        }

        let req = test::TestRequest::get()
            .uri("/api/messages/alice")
            .insert_header(bearer("bob"))
            .to_request();
        let history: Vec<Envelope> = test::call_and_read_body_json(&app, req).await;

        let contents: Vec<&str> = history.iter().map(|e| e.ciphertext.as_str()).collect();
        assert_eq!(contents, vec!["t1", "t2", "t3"]);
        assert_eq!(history[1].sender, Identity::from("bob"));
    }

    #[actix_web::test]
    async fn test_send_rejects_empty_receiver() {
        let app = test::init_service(App::new().app_data(chat_state()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/messages")
            .insert_header(bearer("alice"))
            .set_json(serde_json::json!({ "receiver": "", "ciphertext": "x", "iv": "y" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_ws_rejects_missing_token() {
        let app = test::init_service(App::new().app_data(chat_state()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/ws").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn test_send_malformed_body_gets_json_error() {
        let app = test::init_service(App::new().app_data(chat_state()).configure(configure)).await;

        for body in ["{not json", r#"{"receiver":"bob"}"#] {
            let req = test::TestRequest::post()
                .uri("/api/messages")
                .insert_header(bearer("alice"))
                .insert_header(("Content-Type", "application/json"))
                .set_payload(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 400);

            let error: serde_json::Value = test::read_body_json(resp).await;
            assert!(error["error"].as_str().is_some_and(|e| !e.is_empty()));
        }
    }
}
