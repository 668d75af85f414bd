// src/jwks/model.rs

use crate::error::NilaIsbError;
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};

const KEY_TYPE_RSA: &str = "RSA";
const KEY_USE_SIGNATURE: &str = "sig";

/// Represents a single JSON Web Key (JWK) as defined in RFC 7517.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKey {
    /// Empty when the record carries no `kid`; such records never match a lookup.
    #[serde(default)]
    pub kid: String,
    #[serde(default)]
    pub kty: String,
    /// The intended use of the key, `sig` or `enc`.
    #[serde(rename = "use")]
    pub use_purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Modulus, Base64urlUInt encoded (RFC 7518 section 6.3.1.1).
    pub n: Option<String>,
    /// Exponent, Base64urlUInt encoded (RFC 7518 section 6.3.1.2).
    pub e: Option<String>,
}

impl JsonWebKey {
    /// Decodes the key into an RSA public key usable for signature verification.
    ///
    /// Only `kty=RSA` keys declared for `use=sig` are accepted.
    pub fn decode(&self) -> Result<RsaPublicKey, NilaIsbError> {
        if self.kty != KEY_TYPE_RSA {
            return Err(NilaIsbError::KeyFormat(format!("key type '{}' not supported", self.kty)));
        }
        match self.use_purpose.as_deref() {
            Some(KEY_USE_SIGNATURE) => {}
            other => {
                return Err(NilaIsbError::KeyFormat(format!(
                    "key usage '{}' not supported",
                    other.unwrap_or_default()
                )))
            }
        }

        let n = self
            .n
            .as_deref()
            .ok_or_else(|| NilaIsbError::KeyFormat("RSA key missing 'n' component".to_string()))?;
        let e = self
            .e
            .as_deref()
            .ok_or_else(|| NilaIsbError::KeyFormat("RSA key missing 'e' component".to_string()))?;

        let modulus = URL_SAFE_NO_PAD
            .decode(n)
            .map_err(|err| NilaIsbError::KeyFormat(format!("invalid modulus: {err}")))?;
        let exponent = URL_SAFE_NO_PAD
            .decode(e)
            .map_err(|err| NilaIsbError::KeyFormat(format!("invalid exponent: {err}")))?;

        RsaPublicKey::new(BigUint::from_bytes_be(&modulus), BigUint::from_bytes_be(&exponent))
            .map_err(|err| NilaIsbError::KeyFormat(format!("invalid RSA public key: {err}")))
    }
}

/// Represents a JSON Web Key Set (JWKS), which is a collection of JWKs.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}
