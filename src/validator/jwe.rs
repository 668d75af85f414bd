// src/validator/jwe.rs

//! The encrypted envelope (JWE compact serialization) around the identity token.

use crate::error::NilaIsbError;
use aes::{Aes128, Aes256};
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rsa::{Oaep, RsaPrivateKey};
use serde::Deserialize;
use sha2::{Sha256, Sha512};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyManagement {
    RsaOaep,
    RsaOaep256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentEncryption {
    A128CbcHs256,
    A256CbcHs512,
}

impl ContentEncryption {
    /// Length of the combined MAC and encryption key.
    fn key_len(self) -> usize {
        match self {
            ContentEncryption::A128CbcHs256 => 32,
            ContentEncryption::A256CbcHs512 => 64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
    #[serde(default)]
    zip: Option<String>,
    #[serde(default)]
    crit: Option<Vec<String>>,
}

fn malformed(reason: impl Into<String>) -> NilaIsbError {
    NilaIsbError::MalformedToken(reason.into())
}

fn decode_part(part: &str, name: &str) -> Result<Vec<u8>, NilaIsbError> {
    URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|e| malformed(format!("invalid base64 in JWE {name}: {e}")))
}

/// A parsed, still encrypted identity token.
#[derive(Debug)]
pub struct EncryptedToken {
    alg: KeyManagement,
    enc: ContentEncryption,
    // The protected header exactly as transmitted; it is the AAD.
    protected: String,
    encrypted_key: Vec<u8>,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

/// The plaintext of an [`EncryptedToken`]; a signed envelope that has not been verified.
#[derive(Debug)]
pub struct DecryptedPayload(Vec<u8>);

impl DecryptedPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl EncryptedToken {
    pub fn parse(token: &str) -> Result<Self, NilaIsbError> {
        let parts: Vec<&str> = token.trim().split('.').collect();
        let [protected, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
            return Err(malformed(format!("expected 5 JWE segments, found {}", parts.len())));
        };

        let header: JweHeader = serde_json::from_slice(&decode_part(protected, "header")?)
            .map_err(|e| malformed(format!("invalid JWE header: {e}")))?;

        let alg = match header.alg.as_str() {
            "RSA-OAEP" => KeyManagement::RsaOaep,
            "RSA-OAEP-256" => KeyManagement::RsaOaep256,
            other => return Err(malformed(format!("unsupported key management algorithm '{other}'"))),
        };
        let enc = match header.enc.as_str() {
            "A128CBC-HS256" => ContentEncryption::A128CbcHs256,
            "A256CBC-HS512" => ContentEncryption::A256CbcHs512,
            other => return Err(malformed(format!("unsupported content encryption '{other}'"))),
        };
        if let Some(crit) = header.crit {
            return Err(malformed(format!("unsupported critical header parameters: {}", crit.join(", "))));
        }
        if let Some(zip) = header.zip {
            return Err(malformed(format!("compressed payloads are not supported (zip={zip})")));
        }

        Ok(Self {
            alg,
            enc,
            protected: protected.to_string(),
            encrypted_key: decode_part(encrypted_key, "encrypted key")?,
            iv: decode_part(iv, "initialization vector")?,
            ciphertext: decode_part(ciphertext, "ciphertext")?,
            tag: decode_part(tag, "authentication tag")?,
        })
    }

    /// Unwraps the content key with `key`, checks the tag and decrypts the content.
    pub fn decrypt(&self, key: &RsaPrivateKey) -> Result<DecryptedPayload, NilaIsbError> {
        let padding = match self.alg {
            KeyManagement::RsaOaep => Oaep::new::<sha1::Sha1>(),
            KeyManagement::RsaOaep256 => Oaep::new::<Sha256>(),
        };
        let cek = key
            .decrypt(padding, &self.encrypted_key)
            .map_err(|e| NilaIsbError::Decryption(format!("failed to unwrap content key: {e}")))?;
        if cek.len() != self.enc.key_len() {
            return Err(NilaIsbError::Decryption("content key has wrong length".to_string()));
        }

        let (mac_key, enc_key) = cek.split_at(cek.len() / 2);
        self.verify_tag(mac_key)?;

        let plaintext = match self.enc {
            ContentEncryption::A128CbcHs256 => cbc::Decryptor::<Aes128>::new_from_slices(enc_key, &self.iv)
                .map_err(|_| NilaIsbError::Decryption("invalid initialization vector".to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(&self.ciphertext),
            ContentEncryption::A256CbcHs512 => cbc::Decryptor::<Aes256>::new_from_slices(enc_key, &self.iv)
                .map_err(|_| NilaIsbError::Decryption("invalid initialization vector".to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(&self.ciphertext),
        }
        .map_err(|_| NilaIsbError::Decryption("invalid padding".to_string()))?;

        Ok(DecryptedPayload(plaintext))
    }

    // RFC 7516 appendix B: tag = leftmost half of HMAC(AAD || IV || ciphertext || AL).
    fn verify_tag(&self, mac_key: &[u8]) -> Result<(), NilaIsbError> {
        if self.tag.len() != mac_key.len() {
            return Err(NilaIsbError::Decryption("authentication tag has wrong length".to_string()));
        }
        let aad = self.protected.as_bytes();
        let al = ((aad.len() as u64) * 8).to_be_bytes();
        let parts: [&[u8]; 4] = [aad, &self.iv, &self.ciphertext, &al];

        let verified = match self.enc {
            ContentEncryption::A128CbcHs256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(mac_key)
                    .map_err(|_| NilaIsbError::Decryption("invalid MAC key".to_string()))?;
                parts.iter().for_each(|part| mac.update(part));
                mac.verify_truncated_left(&self.tag)
            }
            ContentEncryption::A256CbcHs512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(mac_key)
                    .map_err(|_| NilaIsbError::Decryption("invalid MAC key".to_string()))?;
                parts.iter().for_each(|part| mac.update(part));
                mac.verify_truncated_left(&self.tag)
            }
        };
        verified.map_err(|_| NilaIsbError::Decryption("authentication tag mismatch".to_string()))
    }
}
