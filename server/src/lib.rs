/// Secure Chat relay server library.
///
/// Exposes the relay core (authentication, session registry, offline store,
/// envelope relay) and the HTTP/WebSocket surfaces built on top of it, so the
/// binary, the integration tests and the client's tests can share one setup.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod relay;
pub mod server;
pub mod store;

pub use auth::{Authenticator, Identity};
pub use error::{RelayError, StoreError};
pub use registry::{Outbound, SessionHandle, SessionRegistry};
pub use relay::{EnvelopeRelay, RelayOutcome};
pub use store::{OfflineStore, SqliteStore};
