// src/flow.rs

use crate::config::Config;
use crate::error::NilaIsbError;
use crate::exchange::{AccessResponse, TokenExchanger};
use crate::generator::request::AuthorizationRequest;
use crate::generator::AssertionSigner;
use crate::jwks::{KeyCache, KeyProvider};
use crate::keys::{ClientKeys, SigningKey};
use crate::util::random_token;
use crate::validator::model::Identity;
use crate::validator::IdentityVerifier;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

/// What the caller must keep (e.g. in a session) between redirect and callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuth {
    /// Where to send the user agent.
    pub redirect_url: Url,
    pub nonce: String,
    pub state: String,
}

/// The query or form parameters of the broker's callback.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn describe_broker_error(error: &str, description: Option<&str>) -> String {
    match description {
        Some(description) => format!("{description} ({error})"),
        None => error.to_string(),
    }
}

impl CallbackParams {
    /// Parses `state=..&code=..` style query or form strings.
    pub fn from_query(query: &str) -> Result<Self, NilaIsbError> {
        serde_urlencoded::from_str(query.trim_start_matches('?'))
            .map_err(|e| NilaIsbError::Protocol(format!("invalid callback parameters: {e}")))
    }

    /// Checks the parameters against the pending request and returns the code.
    ///
    /// Runs before any network or cryptographic work.
    pub fn authorization_code(&self, pending: &PendingAuth) -> Result<&str, NilaIsbError> {
        if let Some(error) = non_empty(&self.error) {
            return Err(NilaIsbError::Protocol(format!(
                "identification failed: {}",
                describe_broker_error(error, non_empty(&self.error_description))
            )));
        }
        let state = non_empty(&self.state)
            .ok_or_else(|| NilaIsbError::Protocol("state parameter is missing or empty".to_string()))?;
        let code = non_empty(&self.code)
            .ok_or_else(|| NilaIsbError::Protocol("code parameter is missing or empty".to_string()))?;
        if state != pending.state {
            return Err(NilaIsbError::Protocol("state parameter does not match the request".to_string()));
        }
        Ok(code)
    }
}

/// The relying party: builds authorization requests and resolves codes into identities.
///
/// Cheap to clone; all clones share keys, HTTP clients and the key cache.
#[derive(Clone)]
pub struct RelyingParty {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    signing_key: Arc<SigningKey>,
    exchanger: TokenExchanger,
    verifier: IdentityVerifier,
}

impl RelyingParty {
    /// Creates a relying party that fetches broker keys from `config.jwks_url`.
    pub fn new(config: Config, keys: ClientKeys) -> Result<Self, NilaIsbError> {
        let key_cache = KeyCache::new(config.jwks_url.clone(), config.key_cache_interval, config.http_timeout)?;
        Self::with_key_provider(config, keys, Arc::new(key_cache))
    }

    /// Creates a relying party that resolves verification keys through `key_provider`.
    pub fn with_key_provider(
        config: Config,
        keys: ClientKeys,
        key_provider: Arc<dyn KeyProvider>,
    ) -> Result<Self, NilaIsbError> {
        let signing_key = Arc::new(keys.signing);
        let signer = AssertionSigner::new(
            config.client_id.clone(),
            config.token_url.clone(),
            config.assertion_lifetime,
            signing_key.clone(),
        );
        let exchanger = TokenExchanger::new(config.token_url.clone(), signer, config.http_timeout)?;
        let verifier = IdentityVerifier::new(keys.encryption, key_provider, config.validation.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                signing_key,
                exchanger,
                verifier,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Generates nonce and state and returns the signed redirect to the authorize endpoint.
    pub fn begin_auth(&self) -> Result<PendingAuth, NilaIsbError> {
        let config = &self.inner.config;
        let nonce = random_token(config.token_length);
        let state = random_token(config.token_length);

        let request_token = AuthorizationRequest::new(config, nonce.clone(), state.clone()).sign(&self.inner.signing_key)?;
        let mut redirect_url = config.authorize_url.clone();
        redirect_url.query_pairs_mut().append_pair("request", &request_token);

        debug!("Authorization request issued.");
        Ok(PendingAuth {
            redirect_url,
            nonce,
            state,
        })
    }

    /// Exchanges `code` for tokens and returns the verified identity.
    ///
    /// The identity's `nonce` is not compared; use [`RelyingParty::handle_callback`]
    /// or compare it with the value from [`PendingAuth`] yourself.
    pub async fn complete_auth(&self, code: &str) -> Result<Identity, NilaIsbError> {
        let access = self.exchange_code(code).await?;
        self.verify_access(&access).await
    }

    /// Validates the callback against `pending`, completes the exchange and checks the nonce.
    #[instrument(level = "debug", skip_all)]
    pub async fn handle_callback(&self, params: &CallbackParams, pending: &PendingAuth) -> Result<Identity, NilaIsbError> {
        let mut attempt = AuthAttempt::resume(pending.clone());
        attempt.complete(self, params).await
    }

    async fn exchange_code(&self, code: &str) -> Result<AccessResponse, NilaIsbError> {
        let access = self.inner.exchanger.exchange(code).await?;
        if let Some(error) = non_empty(&access.error) {
            return Err(NilaIsbError::Protocol(describe_broker_error(
                error,
                non_empty(&access.error_description),
            )));
        }
        Ok(access)
    }

    async fn verify_access(&self, access: &AccessResponse) -> Result<Identity, NilaIsbError> {
        self.inner.verifier.verify(&access.id_token).await
    }
}

/// The caller-visible state of one authentication attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Unstarted,
    /// Nonce and state are committed; waiting for the callback.
    RequestIssued(PendingAuth),
    CodeExchanged,
    IdentityVerified(Identity),
    Failed {
        reason: String,
    },
}

impl AuthState {
    fn name(&self) -> &'static str {
        match self {
            AuthState::Unstarted => "unstarted",
            AuthState::RequestIssued(_) => "request_issued",
            AuthState::CodeExchanged => "code_exchanged",
            AuthState::IdentityVerified(_) => "identity_verified",
            AuthState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthState::IdentityVerified(_) | AuthState::Failed { .. })
    }
}

/// Drives a single authentication attempt through [`AuthState`].
///
/// A failure at any step ends the attempt; start a new one to retry.
#[derive(Debug, Default)]
pub struct AuthAttempt {
    state: AuthState,
}

impl AuthAttempt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores an attempt whose request was issued earlier, e.g. from a session.
    pub fn resume(pending: PendingAuth) -> Self {
        Self {
            state: AuthState::RequestIssued(pending),
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// `Unstarted → RequestIssued`.
    pub fn begin(&mut self, relying_party: &RelyingParty) -> Result<PendingAuth, NilaIsbError> {
        if self.state != AuthState::Unstarted {
            return Err(NilaIsbError::Protocol("authentication attempt already started".to_string()));
        }
        let pending = relying_party.begin_auth().map_err(|e| self.fail(e))?;
        self.transition(AuthState::RequestIssued(pending.clone()));
        Ok(pending)
    }

    /// `RequestIssued → CodeExchanged → IdentityVerified`, or `Failed`.
    pub async fn complete(
        &mut self,
        relying_party: &RelyingParty,
        params: &CallbackParams,
    ) -> Result<Identity, NilaIsbError> {
        let pending = match &self.state {
            AuthState::RequestIssued(pending) => pending.clone(),
            other => {
                return Err(NilaIsbError::Protocol(format!(
                    "no authorization request is pending (state: {other:?})"
                )))
            }
        };

        match self.run(relying_party, params, &pending).await {
            Ok(identity) => {
                self.transition(AuthState::IdentityVerified(identity.clone()));
                Ok(identity)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn run(
        &mut self,
        relying_party: &RelyingParty,
        params: &CallbackParams,
        pending: &PendingAuth,
    ) -> Result<Identity, NilaIsbError> {
        let code = params.authorization_code(pending)?;
        let access = relying_party.exchange_code(code).await?;
        self.transition(AuthState::CodeExchanged);

        let identity = relying_party.verify_access(&access).await?;
        if identity.nonce != pending.nonce {
            return Err(NilaIsbError::NonceMismatch);
        }
        Ok(identity)
    }

    fn transition(&mut self, next: AuthState) {
        debug!(from = self.state.name(), to = next.name(), "Authentication attempt transition.");
        self.state = next;
    }

    fn fail(&mut self, error: NilaIsbError) -> NilaIsbError {
        self.transition(AuthState::Failed {
            reason: error.to_string(),
        });
        error
    }
}
