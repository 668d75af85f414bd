// src/generator/mod.rs

pub mod request;

use crate::error::NilaIsbError;
use crate::keys::SigningKey;
use crate::util::unix_now;
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// `{"alg":"RS256"}`, the only header the broker expects on client tokens.
const RS256_HEADER: &str = r#"{"alg":"RS256"}"#;

/// Signs `payload` with RS256 and returns the compact JWS serialization.
///
/// The payload bytes are embedded as-is, so the caller controls the exact JSON
/// (claim order included) that ends up in the token.
pub fn sign(payload: &[u8], key: &SigningKey) -> Result<String, NilaIsbError> {
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(RS256_HEADER),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = jsonwebtoken::crypto::sign(signing_input.as_bytes(), key.encoding_key(), Algorithm::RS256)
        .map_err(|e| NilaIsbError::Signing(e.to_string()))?;
    Ok(format!("{signing_input}.{signature}"))
}

/// Serializes `claims` to JSON and signs the result.
pub fn sign_json<T: Serialize>(claims: &T, key: &SigningKey) -> Result<String, NilaIsbError> {
    let payload = serde_json::to_vec(claims).map_err(|e| NilaIsbError::Signing(e.to_string()))?;
    sign(&payload, key)
}

/// Claims of the JWT-bearer client assertion sent to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAssertion {
    /// Must contain the client_id.
    pub iss: String,
    /// Must contain the client_id.
    pub sub: String,
    /// The token endpoint URL.
    pub aud: String,
    /// Single use identifier; the broker rejects replays.
    pub jti: String,
    /// Seconds since UNIX epoch.
    pub exp: i64,
}

/// Mints signed client assertions for one client and token endpoint.
#[derive(Clone)]
pub struct AssertionSigner {
    client_id: String,
    audience: Url,
    lifetime: Duration,
    key: Arc<SigningKey>,
}

impl AssertionSigner {
    pub fn new(client_id: impl Into<String>, audience: Url, lifetime: Duration, key: Arc<SigningKey>) -> Self {
        Self {
            client_id: client_id.into(),
            audience,
            lifetime,
            key,
        }
    }

    /// Builds the claim set for `token_id`, expiring `lifetime` from now.
    pub fn assertion(&self, token_id: impl Into<String>) -> ClientAssertion {
        ClientAssertion {
            iss: self.client_id.clone(),
            sub: self.client_id.clone(),
            aud: self.audience.to_string(),
            jti: token_id.into(),
            exp: unix_now() + self.lifetime.as_secs() as i64,
        }
    }

    /// Returns a signed client assertion for `token_id`.
    pub fn sign(&self, token_id: impl Into<String>) -> Result<String, NilaIsbError> {
        sign_json(&self.assertion(token_id), &self.key)
    }
}
