// src/validator/mod.rs

pub mod jwe;
pub mod jws;
pub mod model;

use crate::config::ValidationDetails;
use crate::error::NilaIsbError;
use crate::jwks::KeyProvider;
use crate::keys::EncryptionKey;
use jwe::EncryptedToken;
use jws::SignedEnvelope;
use model::Identity;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Decrypts, verifies and validates an identity token.
///
/// The stages run strictly in order, each consuming the output of the previous one:
/// 1. parse the encrypted envelope,
/// 2. decrypt it with `encryption_key`,
/// 3. parse the signed envelope and require exactly one signature,
/// 4. resolve the signature's `kid` through `keys`,
/// 5. verify the signature,
/// 6. decode the identity claims,
/// 7. reject an expired identity.
///
/// The `nonce` claim is not compared here; the caller holds the expected value.
pub async fn verify_identity_token(
    token: &str,
    encryption_key: &EncryptionKey,
    keys: &dyn KeyProvider,
    validation: &ValidationDetails,
) -> Result<Identity, NilaIsbError> {
    let encrypted = EncryptedToken::parse(token)?;
    let decrypted = encrypted.decrypt(encryption_key.private_key())?;

    let payload = std::str::from_utf8(decrypted.as_bytes())
        .map_err(|_| NilaIsbError::MalformedToken("decrypted payload is not UTF-8".to_string()))?;
    let signed = SignedEnvelope::parse(payload)?;

    let public_key = keys.public_key(signed.key_id()?).await?;
    let verified = signed.verify(&public_key, &validation.algorithms)?;

    let identity = verified.into_identity()?;
    identity.validate()?;
    Ok(identity)
}

/// The Identity Verifier, bound to the relying party's encryption key and a key provider.
///
/// Created once and shared across requests.
pub struct IdentityVerifier {
    encryption_key: EncryptionKey,
    keys: Arc<dyn KeyProvider>,
    validation: ValidationDetails,
}

impl IdentityVerifier {
    pub fn new(encryption_key: EncryptionKey, keys: Arc<dyn KeyProvider>, validation: ValidationDetails) -> Self {
        Self {
            encryption_key,
            keys,
            validation,
        }
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn verify(&self, token: &str) -> Result<Identity, NilaIsbError> {
        let identity = verify_identity_token(token, &self.encryption_key, self.keys.as_ref(), &self.validation).await?;
        debug!("Identity token verified, expires at {}", identity.exp);
        Ok(identity)
    }
}
