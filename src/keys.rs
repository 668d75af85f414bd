// src/keys.rs

//! Loading of the relying party's own RSA private keys.
//!
//! Both keys are loaded once at startup and shared read-only afterwards.

use crate::error::NilaIsbError;
use jsonwebtoken::EncodingKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use std::fmt;
use std::path::Path;

fn parse_rsa_pem(pem: &str) -> Result<RsaPrivateKey, NilaIsbError> {
    // PKCS#1 first, then PKCS#8.
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| NilaIsbError::InvalidPrivateKey(format!("failed to parse RSA private key PEM: {e}")))
}

fn read_pem(path: &Path) -> Result<String, NilaIsbError> {
    std::fs::read_to_string(path).map_err(|e| {
        NilaIsbError::InvalidPrivateKey(format!("failed to read private key file {:?}: {}", path, e))
    })
}

/// The RSA key used to sign authorization requests and client assertions.
pub struct SigningKey {
    encoding_key: EncodingKey,
}

impl SigningKey {
    /// Parses a PEM-encoded PKCS#1 (or PKCS#8) RSA private key.
    pub fn from_pem(pem: &str) -> Result<Self, NilaIsbError> {
        Self::from_rsa(&parse_rsa_pem(pem)?)
    }

    /// Reads and parses a PEM-encoded RSA private key file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, NilaIsbError> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    /// Wraps an already parsed RSA private key.
    pub fn from_rsa(private_key: &RsaPrivateKey) -> Result<Self, NilaIsbError> {
        let pkcs1_der = private_key.to_pkcs1_der().map_err(|e| {
            NilaIsbError::InvalidPrivateKey(format!("failed to convert RSA key to PKCS#1 DER: {e}"))
        })?;
        Ok(Self {
            encoding_key: EncodingKey::from_rsa_der(pkcs1_der.as_bytes()),
        })
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// The RSA key the broker encrypts identity tokens to.
pub struct EncryptionKey {
    private_key: RsaPrivateKey,
}

impl EncryptionKey {
    /// Parses a PEM-encoded PKCS#1 (or PKCS#8) RSA private key.
    pub fn from_pem(pem: &str) -> Result<Self, NilaIsbError> {
        Ok(Self { private_key: parse_rsa_pem(pem)? })
    }

    /// Reads and parses a PEM-encoded RSA private key file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, NilaIsbError> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }
}

impl From<RsaPrivateKey> for EncryptionKey {
    fn from(private_key: RsaPrivateKey) -> Self {
        Self { private_key }
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// The pair of private keys a relying party owns.
#[derive(Debug)]
pub struct ClientKeys {
    pub signing: SigningKey,
    pub encryption: EncryptionKey,
}

impl ClientKeys {
    pub fn new(signing: SigningKey, encryption: EncryptionKey) -> Self {
        Self { signing, encryption }
    }

    /// Loads both keys from PEM files.
    pub fn from_pem_files(
        signing_path: impl AsRef<Path>,
        encryption_path: impl AsRef<Path>,
    ) -> Result<Self, NilaIsbError> {
        Ok(Self {
            signing: SigningKey::from_pem_file(signing_path)?,
            encryption: EncryptionKey::from_pem_file(encryption_path)?,
        })
    }
}
