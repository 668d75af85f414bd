// src/validator/model.rs

use crate::error::NilaIsbError;
use crate::util::unix_now;
use serde::{Deserialize, Serialize};

/// The claims of a decrypted and verified identity token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Identity {
    /// Audience this token is intended for. Contains the relying party client_id.
    #[serde(default)]
    pub aud: String,
    /// Seconds since UNIX epoch on or after which the token must not be accepted.
    pub exp: i64,
    /// The nonce of the authorization request. Compared by the caller.
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub birthdate: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    /// Family name and given name.
    #[serde(default)]
    pub name: String,
    /// The national personal identity code.
    #[serde(default)]
    pub personal_identity_code: String,
}

impl Identity {
    /// Fails with `ExpiredIdentity` if `exp` is at or before the current time.
    pub fn validate(&self) -> Result<(), NilaIsbError> {
        self.validate_at(unix_now())
    }

    pub fn validate_at(&self, now: i64) -> Result<(), NilaIsbError> {
        if self.exp <= now {
            return Err(NilaIsbError::ExpiredIdentity { exp: self.exp });
        }
        Ok(())
    }
}
