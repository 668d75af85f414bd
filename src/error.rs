// src/error.rs

use jsonwebtoken::Algorithm;
use thiserror::Error;

/// The primary error type for the `nila-isb` library.
///
/// Every variant is a distinct, non-retryable failure kind. The library never
/// retries on its own; the caller decides what to do with each kind.
#[derive(Debug, Error)]
pub enum NilaIsbError {
    /// The HTTP call to the token endpoint could not be completed.
    #[error("HTTP transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The key-set source could not be reached or answered with a non-success status.
    #[error("Key set source error: {0}")]
    KeySource(String),

    /// The key set, or a single key record in it, is malformed or not allowed.
    #[error("Invalid key format: {0}")]
    KeyFormat(String),

    /// No key with the given `kid` exists in the current key set.
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),

    /// The token endpoint answered with a non-200 status.
    #[error("Token endpoint returned status code {status}")]
    TokenEndpoint { status: u16 },

    /// The token endpoint body could not be decoded.
    #[error("Invalid token endpoint response: {0}")]
    ResponseFormat(String),

    /// An encrypted or signed envelope could not be parsed.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The encrypted envelope could not be decrypted with the configured key.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// The signed envelope does not carry exactly one signature.
    #[error("Expected exactly one signature, found {0}")]
    UnexpectedSignatureCount(usize),

    /// The signature does not match the resolved public key.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// The verified payload is not a valid identity claim set.
    #[error("Failed to decode identity claims: {0}")]
    ClaimDecode(#[source] serde_json::Error),

    /// The identity's `exp` claim is at or before the current time.
    #[error("Identity has expired (exp: {exp})")]
    ExpiredIdentity { exp: i64 },

    /// Producing a signed token failed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The callback or token response violates the protocol, or the broker reported an error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The nonce in the identity does not match the nonce of the authorization request.
    #[error("Nonce mismatch: the nonce in the token does not match the expected nonce")]
    NonceMismatch,

    /// The signed envelope header is missing the `kid` field.
    ///
    /// Raised instead of looking up an empty key id, which would end in `KeyNotFound("")`.
    #[error("The JWS header is missing the 'kid' (Key ID) field")]
    MissingKeyId,

    /// The signature algorithm is not in the configured allow-list.
    #[error("Unsupported algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A PEM encoded private key could not be read or parsed.
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
}
