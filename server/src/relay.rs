/// Envelope relay.
/// Parses inbound envelopes, persists them, then forwards them to the
/// receiver's live session when there is one. Persistence always completes
/// before any forward attempt.
use crate::auth::Identity;
use crate::error::RelayError;
use crate::registry::{Outbound, SessionRegistry};
use crate::store::models::{Envelope, ForwardedEnvelope, InboundEnvelope, NewEnvelope};
use crate::store::OfflineStore;
use std::sync::Arc;

/// What happened to an envelope after it was persisted
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// Queued on the receiver's live transport
    Delivered(Envelope),
    /// Receiver offline or its transport already gone; kept for history
    Stored(Envelope),
}

impl RelayOutcome {
    pub fn envelope(&self) -> &Envelope {
        match self {
            RelayOutcome::Delivered(e) | RelayOutcome::Stored(e) => e,
        }
    }

    pub fn delivered(&self) -> bool {
        matches!(self, RelayOutcome::Delivered(_))
    }
}

/// Relay service shared by every connection
#[derive(Clone)]
pub struct EnvelopeRelay {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn OfflineStore>,
}

impl EnvelopeRelay {
    pub fn new(registry: Arc<SessionRegistry>, store: Arc<dyn OfflineStore>) -> Self {
        EnvelopeRelay { registry, store }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Handle one raw frame received from `sender`'s connection
    pub async fn handle_inbound(
        &self,
        sender: &Identity,
        raw_payload: &str,
    ) -> Result<RelayOutcome, RelayError> {
        let parsed = parse_inbound(raw_payload).and_then(|inbound| {
            validate(&inbound)?;
            Ok(inbound)
        });
        let inbound = match parsed {
            Ok(inbound) => inbound,
            Err(e) => {
                log::warn!("Dropping envelope from {}: {}", sender, e);
                return Err(e);
            }
        };
        self.relay(sender, inbound).await
    }

    /// Persist and forward an already-decoded envelope
    pub async fn relay(
        &self,
        sender: &Identity,
        inbound: InboundEnvelope,
    ) -> Result<RelayOutcome, RelayError> {
        validate(&inbound)?;

        let pending = NewEnvelope {
            sender: sender.clone(),
            receiver: Identity::from(inbound.receiver),
            ciphertext: inbound.ciphertext,
            iv: inbound.iv,
            // the store stamps it
            timestamp: None,
        };

        let envelope = match self.store.append(pending).await {
            Ok(envelope) => envelope,
            Err(e) => {
                log::error!("Failed to store envelope from {}: {}", sender, e);
                return Err(RelayError::PersistenceFailure(e));
            }
        };
        log::debug!("Envelope {} stored ({} -> {})", envelope.id, envelope.sender, envelope.receiver);

        Ok(self.forward(envelope).await)
    }

    /// Ordered conversation between two identities
    pub async fn history(&self, a: &Identity, b: &Identity) -> Result<Vec<Envelope>, RelayError> {
        Ok(self.store.query(a, b).await?)
    }

    async fn forward(&self, envelope: Envelope) -> RelayOutcome {
        let Some(session) = self.registry.lookup(&envelope.receiver).await else {
            log::info!(
                "{} is offline, envelope {} stored for later retrieval",
                envelope.receiver,
                envelope.id
            );
            return RelayOutcome::Stored(envelope);
        };

        let frame = match serde_json::to_string(&ForwardedEnvelope::from(&envelope)) {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Failed to encode envelope {}: {}", envelope.id, e);
                return RelayOutcome::Stored(envelope);
            }
        };

        match session.send(Outbound::Envelope(frame)) {
            Ok(()) => {
                log::info!("Envelope {} relayed to {}", envelope.id, envelope.receiver);
                RelayOutcome::Delivered(envelope)
            }
            Err(_) => {
                log::debug!(
                    "Session for {} closed before delivery of envelope {}",
                    envelope.receiver,
                    envelope.id
                );
                RelayOutcome::Stored(envelope)
            }
        }
    }
}

fn parse_inbound(raw_payload: &str) -> Result<InboundEnvelope, RelayError> {
    serde_json::from_str(raw_payload).map_err(|e| RelayError::MalformedEnvelope(e.to_string()))
}

fn validate(inbound: &InboundEnvelope) -> Result<(), RelayError> {
    for (field, value) in [
        ("receiver", &inbound.receiver),
        ("ciphertext", &inbound.ciphertext),
        ("iv", &inbound.iv),
    ] {
        if value.is_empty() {
            return Err(RelayError::MalformedEnvelope(format!("empty field `{}`", field)));
        }
    }
    Ok(())
}
