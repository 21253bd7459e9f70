/// Connection authentication.
/// Verifies HS256 JSON Web Tokens presented when a connection is opened and
/// turns them into an `Identity`. Stateless apart from the shared secret.
use crate::error::RelayError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Authenticated participant (username-equivalent, immutable)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Identity(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Identity(name.to_string())
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Identity(name)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Token claims. Only `username` is required.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Verifies credentials against the shared secret
#[derive(Clone)]
pub struct Authenticator {
    secret: Vec<u8>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Authenticator {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Validate a credential and return the identity it names.
    ///
    /// Fails with `Unauthorized` when the credential is absent, malformed,
    /// signed with another key or algorithm, or past its `exp` claim.
    pub fn authenticate(&self, credential: Option<&str>) -> Result<Identity, RelayError> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::Unauthorized("No token provided".to_string()))?;

        let mut parts = token.split('.');
        let (header_b64, claims_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(c), Some(s), None) => (h, c, s),
                _ => return Err(invalid("token must have three segments")),
            };

        let header: Header = decode_segment(header_b64)?;
        if header.alg != "HS256" {
            return Err(invalid("unsupported signing algorithm"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| invalid("signature is not base64url"))?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| invalid("signature mismatch"))?;

        let claims: Claims = decode_segment(claims_b64)?;
        if let Some(exp) = claims.exp {
            if Utc::now().timestamp() >= exp {
                return Err(RelayError::Unauthorized("Token expired".to_string()));
            }
        }
        if claims.username.is_empty() {
            return Err(invalid("empty username claim"));
        }

        Ok(Identity(claims.username))
    }

    /// Sign a token for `identity`. Used by tests and local tooling; issuing
    /// credentials to users is handled by the login service.
    pub fn issue(
        &self,
        identity: &Identity,
        ttl: Option<Duration>,
    ) -> Result<String, RelayError> {
        let now = Utc::now().timestamp();
        let header = Header {
            alg: "HS256".to_string(),
            typ: Some("JWT".to_string()),
        };
        let claims = Claims {
            username: identity.0.clone(),
            iat: Some(now),
            exp: ttl.map(|ttl| now + ttl.as_secs() as i64),
        };
        self.sign(&header, &claims)
    }

    fn sign(&self, header: &Header, claims: &Claims) -> Result<String, RelayError> {
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).map_err(encode_failed)?);
        let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).map_err(encode_failed)?);

        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}.{}", header_b64, claims_b64, signature))
    }

    fn mac(&self) -> Result<HmacSha256, RelayError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| RelayError::Unauthorized("Invalid verification key".to_string()))
    }
}

fn encode_failed(e: serde_json::Error) -> RelayError {
    RelayError::Unauthorized(format!("Cannot encode token: {}", e))
}

fn invalid(reason: &str) -> RelayError {
    RelayError::Unauthorized(format!("Invalid token: {}", reason))
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, RelayError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| invalid("segment is not base64url"))?;
    serde_json::from_slice(&bytes).map_err(|_| invalid("segment is not valid JSON"))
}
