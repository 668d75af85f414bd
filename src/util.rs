// src/util.rs

use base64::engine::{general_purpose::URL_SAFE, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns `length` bytes from the operating system CSPRNG, URL-safe base64 encoded.
///
/// Used for `nonce` and `state` values. The encoding keeps `=` padding.
pub fn random_token(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}

/// Seconds since the UNIX epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_token_length_and_uniqueness() {
        let a = random_token(32);
        let b = random_token(32);
        assert_ne!(a, b);
        assert_eq!(URL_SAFE.decode(&a).unwrap().len(), 32);
        assert_eq!(URL_SAFE.decode(&b).unwrap().len(), 32);
        assert!(!a.contains('+') && !a.contains('/'));
    }
}
