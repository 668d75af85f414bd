// src/validator/jws.rs

//! The signed envelope (JWS) inside the decrypted identity token.

use super::model::Identity;
use crate::error::NilaIsbError;
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, DecodingKey};
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::Deserialize;

fn malformed(reason: impl Into<String>) -> NilaIsbError {
    NilaIsbError::MalformedToken(reason.into())
}

fn decode_part(part: &str, name: &str) -> Result<Vec<u8>, NilaIsbError> {
    URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|e| malformed(format!("invalid base64 in JWS {name}: {e}")))
}

#[derive(Debug, Default, Deserialize)]
struct HeaderFields {
    alg: Option<Algorithm>,
    kid: Option<String>,
    // No header extensions are understood, so any `crit` entry is unprocessable.
    crit: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct JsonSignature {
    protected: Option<String>,
    header: Option<HeaderFields>,
    signature: String,
}

/// General and flattened JWS JSON serialization.
#[derive(Debug, Deserialize)]
struct JsonSerialization {
    payload: String,
    signatures: Option<Vec<JsonSignature>>,
    protected: Option<String>,
    header: Option<HeaderFields>,
    signature: Option<String>,
}

/// A signed envelope carrying exactly one signature, not yet verified.
#[derive(Debug)]
pub struct SignedEnvelope {
    alg: Algorithm,
    kid: Option<String>,
    signing_input: String,
    signature: String,
    payload: Vec<u8>,
}

/// A payload whose signature has been verified.
#[derive(Debug)]
pub struct VerifiedPayload(Vec<u8>);

impl VerifiedPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decodes the payload as identity claims.
    pub fn into_identity(self) -> Result<Identity, NilaIsbError> {
        serde_json::from_slice(&self.0).map_err(NilaIsbError::ClaimDecode)
    }
}

impl SignedEnvelope {
    /// Parses compact or JSON serialization.
    ///
    /// Anything other than exactly one signature fails with `UnexpectedSignatureCount`.
    pub fn parse(input: &str) -> Result<Self, NilaIsbError> {
        let input = input.trim();
        if input.starts_with('{') {
            return Self::parse_json(input);
        }

        let parts: Vec<&str> = input.split('.').collect();
        let [protected, payload, signature] = parts.as_slice() else {
            return Err(malformed(format!("expected 3 JWS segments, found {}", parts.len())));
        };
        Self::from_parts(protected, None, payload, signature)
    }

    fn parse_json(input: &str) -> Result<Self, NilaIsbError> {
        let json: JsonSerialization =
            serde_json::from_str(input).map_err(|e| malformed(format!("invalid JWS JSON serialization: {e}")))?;

        let mut signatures = match (json.signatures, json.signature) {
            (Some(signatures), None) => signatures,
            (None, Some(signature)) => vec![JsonSignature {
                protected: json.protected,
                header: json.header,
                signature,
            }],
            (None, None) => Vec::new(),
            (Some(_), Some(_)) => return Err(malformed("both 'signatures' and 'signature' present")),
        };
        if signatures.len() != 1 {
            return Err(NilaIsbError::UnexpectedSignatureCount(signatures.len()));
        }

        let single = signatures.remove(0);
        let protected = single
            .protected
            .ok_or_else(|| malformed("signature has no protected header"))?;
        Self::from_parts(&protected, single.header, &json.payload, &single.signature)
    }

    fn from_parts(
        protected: &str,
        unprotected: Option<HeaderFields>,
        payload: &str,
        signature: &str,
    ) -> Result<Self, NilaIsbError> {
        let header: HeaderFields = serde_json::from_slice(&decode_part(protected, "header")?)
            .map_err(|e| malformed(format!("invalid JWS header: {e}")))?;
        if let Some(crit) = header.crit.as_ref().or(unprotected.as_ref().and_then(|h| h.crit.as_ref())) {
            return Err(malformed(format!("unsupported critical header parameters: {}", crit.join(", "))));
        }
        let alg = header
            .alg
            .ok_or_else(|| malformed("protected header has no 'alg'"))?;
        let kid = header.kid.or_else(|| unprotected.and_then(|h| h.kid));

        decode_part(signature, "signature")?;
        Ok(Self {
            alg,
            kid,
            signing_input: format!("{protected}.{payload}"),
            signature: signature.to_string(),
            payload: decode_part(payload, "payload")?,
        })
    }

    /// The declared key id of the single signature.
    pub fn key_id(&self) -> Result<&str, NilaIsbError> {
        self.kid.as_deref().ok_or(NilaIsbError::MissingKeyId)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.alg
    }

    /// Verifies the signature with `key`; the algorithm must be in `allowed`.
    pub fn verify(self, key: &RsaPublicKey, allowed: &[Algorithm]) -> Result<VerifiedPayload, NilaIsbError> {
        if !allowed.contains(&self.alg) {
            return Err(NilaIsbError::UnsupportedAlgorithm(self.alg));
        }
        let decoding_key = DecodingKey::from_rsa_raw_components(&key.n().to_bytes_be(), &key.e().to_bytes_be());
        match jsonwebtoken::crypto::verify(&self.signature, self.signing_input.as_bytes(), &decoding_key, self.alg) {
            Ok(true) => Ok(VerifiedPayload(self.payload)),
            _ => Err(NilaIsbError::SignatureVerification),
        }
    }
}
