// src/lib.rs

pub mod config;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod generator;
pub mod jwks;
pub mod keys;
pub mod util;
pub mod validator;

/// The public prelude for the `nila-isb` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::config::{Config, ConfigBuilder, Settings, ValidationDetails};
    pub use crate::error::NilaIsbError;
    pub use crate::exchange::{AccessResponse, TokenExchanger};
    pub use crate::flow::{AuthAttempt, AuthState, CallbackParams, PendingAuth, RelyingParty};
    pub use crate::generator::request::AuthorizationRequest;
    pub use crate::generator::{sign, AssertionSigner, ClientAssertion};
    pub use crate::jwks::{KeyCache, KeyProvider};
    pub use crate::keys::{ClientKeys, EncryptionKey, SigningKey};
    pub use crate::validator::model::Identity;
    pub use crate::validator::{verify_identity_token, IdentityVerifier};
    pub use jsonwebtoken::Algorithm;
}
