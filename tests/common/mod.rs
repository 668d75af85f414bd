// Shared helpers for integration tests: fixture keys, a test broker that signs and
// encrypts identity tokens, and a fixed key provider.
#![allow(dead_code)]

use aes::Aes128;
use async_trait::async_trait;
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, EncodingKey};
use nila_isb::prelude::*;
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const CLIENT_SIGNING_KEY_PEM: &str = include_str!("../fixtures/client-signing-key.pem");
pub const CLIENT_ENCRYPTION_KEY_PEM: &str = include_str!("../fixtures/client-encryption-key.pem");
pub const BROKER_SIGNING_KEY_PEM: &str = include_str!("../fixtures/broker-signing-key.pem");

pub const BROKER_KID: &str = "broker-sig-1";
pub const CLIENT_ID: &str = "saippuakauppias";

pub fn public_key(pem: &str) -> RsaPublicKey {
    RsaPrivateKey::from_pkcs1_pem(pem).unwrap().to_public_key()
}

pub fn client_keys() -> ClientKeys {
    ClientKeys::new(
        SigningKey::from_pem(CLIENT_SIGNING_KEY_PEM).unwrap(),
        EncryptionKey::from_pem(CLIENT_ENCRYPTION_KEY_PEM).unwrap(),
    )
}

pub fn encryption_key() -> EncryptionKey {
    EncryptionKey::from_pem(CLIENT_ENCRYPTION_KEY_PEM).unwrap()
}

/// A JWK record for `public_key`.
pub fn jwk(kid: &str, public_key: &RsaPublicKey) -> serde_json::Value {
    serde_json::json!({
        "kid": kid,
        "kty": "RSA",
        "use": "sig",
        "alg": "RS256",
        "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    })
}

/// The broker key set as served by the key-set endpoint.
pub fn broker_jwks() -> serde_json::Value {
    serde_json::json!({ "keys": [jwk(BROKER_KID, &public_key(BROKER_SIGNING_KEY_PEM))] })
}

/// Identity claims as issued by the broker.
pub fn identity_claims(nonce: &str, exp: i64) -> serde_json::Value {
    serde_json::json!({
        "aud": CLIENT_ID,
        "exp": exp,
        "nonce": nonce,
        "birthdate": "1970-01-01",
        "given_name": "Matti",
        "family_name": "Meikäläinen",
        "name": "Meikäläinen Matti",
        "personal_identity_code": "010170-999R",
    })
}

/// Signs `payload` like the broker does: compact RS256 with a `kid` header.
pub fn broker_sign(payload: &[u8], kid: &str, signing_key_pem: &str) -> String {
    sign_with_header(&serde_json::json!({ "alg": "RS256", "kid": kid }), payload, signing_key_pem)
}

/// Signs `payload` with RS256 under an arbitrary protected header.
pub fn sign_with_header(header: &serde_json::Value, payload: &[u8], signing_key_pem: &str) -> String {
    let header = header.to_string();
    let signing_input = format!("{}.{}", URL_SAFE_NO_PAD.encode(header), URL_SAFE_NO_PAD.encode(payload));
    let key = EncodingKey::from_rsa_pem(signing_key_pem.as_bytes()).unwrap();
    let signature = jsonwebtoken::crypto::sign(signing_input.as_bytes(), &key, Algorithm::RS256).unwrap();
    format!("{signing_input}.{signature}")
}

/// Encrypts `plaintext` to `recipient` with RSA-OAEP and A128CBC-HS256.
pub fn seal(plaintext: &[u8], recipient: &RsaPublicKey) -> String {
    let mut rng = rand::thread_rng();
    let mut cek = [0u8; 32];
    rng.fill_bytes(&mut cek);
    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut iv);

    let protected = URL_SAFE_NO_PAD.encode(r#"{"alg":"RSA-OAEP","enc":"A128CBC-HS256","kid":"client-enc"}"#);
    let encrypted_key = recipient.encrypt(&mut rng, Oaep::new::<sha1::Sha1>(), &cek).unwrap();
    let ciphertext = cbc::Encryptor::<Aes128>::new_from_slices(&cek[16..], &iv)
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let al = ((protected.len() as u64) * 8).to_be_bytes();
    let mut mac = Hmac::<Sha256>::new_from_slice(&cek[..16]).unwrap();
    mac.update(protected.as_bytes());
    mac.update(&iv);
    mac.update(&ciphertext);
    mac.update(&al);
    let tag = mac.finalize().into_bytes();

    format!(
        "{}.{}.{}.{}.{}",
        protected,
        URL_SAFE_NO_PAD.encode(encrypted_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(ciphertext),
        URL_SAFE_NO_PAD.encode(&tag[..16]),
    )
}

/// A complete identity token for the fixture client, signed by the broker key.
pub fn identity_token(nonce: &str, exp: i64) -> String {
    let claims = identity_claims(nonce, exp).to_string();
    let signed = broker_sign(claims.as_bytes(), BROKER_KID, BROKER_SIGNING_KEY_PEM);
    seal(signed.as_bytes(), &public_key(CLIENT_ENCRYPTION_KEY_PEM))
}

pub fn now() -> i64 {
    nila_isb::util::unix_now()
}

/// A fixed key set that counts lookups.
#[derive(Default)]
pub struct StaticKeys {
    keys: HashMap<String, RsaPublicKey>,
    lookups: AtomicUsize,
}

impl StaticKeys {
    pub fn broker() -> Self {
        Self::default().with_key(BROKER_KID, public_key(BROKER_SIGNING_KEY_PEM))
    }

    pub fn with_key(mut self, kid: &str, key: RsaPublicKey) -> Self {
        self.keys.insert(kid.to_string(), key);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyProvider for StaticKeys {
    async fn public_key(&self, kid: &str) -> Result<RsaPublicKey, NilaIsbError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| NilaIsbError::KeyNotFound(kid.to_string()))
    }
}

/// A configuration pointing every endpoint at `base` (usually a mock server).
pub fn config(base: &str) -> Config {
    ConfigBuilder::new()
        .client_id(CLIENT_ID)
        .scope("openid personal_identity_code profile")
        .authorize_url(&format!("{base}/oauth/authorize"))
        .unwrap()
        .token_url(&format!("{base}/oauth/token"))
        .unwrap()
        .callback_url("http://localhost:8000/callback")
        .unwrap()
        .jwks_url(&format!("{base}/jwks/broker"))
        .unwrap()
        .locales("fi")
        .prompt_consent(true)
        .build()
        .unwrap()
}
