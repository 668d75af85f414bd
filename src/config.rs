// src/config.rs

use crate::error::NilaIsbError;
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Suggested lifetime of a client assertion, in seconds.
pub const DEFAULT_ASSERTION_LIFETIME_SECS: u64 = 600;
/// Minimum time between two fetches of the broker key set.
pub const DEFAULT_KEY_CACHE_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Timeout applied to every outbound HTTP call.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);
/// Byte length of nonce and state values before encoding.
pub const DEFAULT_TOKEN_LENGTH: usize = 32;

/// Contains the validation settings for the identity token signature.
#[derive(Clone, Debug)]
pub struct ValidationDetails {
    /// The signing algorithms that are permitted for the identity token.
    /// Tokens signed with any other algorithm will be rejected.
    pub algorithms: Vec<Algorithm>,
}

impl Default for ValidationDetails {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::RS256],
        }
    }
}

/// The configuration of a relying party registered with an identity service broker.
///
/// Construct it with [`ConfigBuilder`]. Private keys are not part of
/// this struct; see [`crate::keys`].
#[derive(Clone, Debug)]
pub struct Config {
    /// The client ID registered with the broker. Used as `iss`/`sub` of client assertions.
    pub client_id: String,
    /// Space-separated scopes requested in the authorization request.
    pub scope: String,
    /// The broker's `/oauth/authorize` endpoint.
    pub authorize_url: Url,
    /// The broker's `/oauth/token` endpoint. Also the audience of client assertions.
    pub token_url: Url,
    /// Where the broker redirects the user agent after authentication.
    pub callback_url: Url,
    /// The broker's key-set endpoint.
    pub jwks_url: Url,
    /// UI locale hint sent as `ui_locales`.
    pub locales: String,
    /// Whether to send `prompt=consent`.
    pub prompt_consent: bool,
    /// How long a client assertion stays valid.
    pub assertion_lifetime: Duration,
    /// Minimum interval between key set refreshes.
    pub key_cache_interval: Duration,
    /// Timeout for outbound HTTP calls.
    pub http_timeout: Duration,
    /// Number of random bytes in nonce and state.
    pub token_length: usize,
    /// Signature validation parameters.
    pub validation: ValidationDetails,
}

/// A builder for creating a `Config` instance.
#[derive(Default)]
pub struct ConfigBuilder {
    client_id: Option<String>,
    scope: Option<String>,
    authorize_url: Option<Url>,
    token_url: Option<Url>,
    callback_url: Option<Url>,
    jwks_url: Option<Url>,
    locales: Option<String>,
    prompt_consent: bool,
    assertion_lifetime: Option<Duration>,
    key_cache_interval: Option<Duration>,
    http_timeout: Option<Duration>,
    token_length: Option<usize>,
    validation: ValidationDetails,
}

fn parse_url(url: &str) -> Result<Url, NilaIsbError> {
    Url::parse(url).map_err(|e| NilaIsbError::InvalidUrl(format!("{url}: {e}")))
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the client ID. This is a required field.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the requested scopes, e.g. `"openid profile personal_identity_code"`. Required.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Sets the authorize endpoint. Required.
    pub fn authorize_url(mut self, url: &str) -> Result<Self, NilaIsbError> {
        self.authorize_url = Some(parse_url(url)?);
        Ok(self)
    }

    /// Sets the token endpoint. Required.
    pub fn token_url(mut self, url: &str) -> Result<Self, NilaIsbError> {
        self.token_url = Some(parse_url(url)?);
        Ok(self)
    }

    /// Sets the callback (redirect) URL. Required.
    pub fn callback_url(mut self, url: &str) -> Result<Self, NilaIsbError> {
        self.callback_url = Some(parse_url(url)?);
        Ok(self)
    }

    /// Sets the key-set endpoint of the broker. Required.
    pub fn jwks_url(mut self, url: &str) -> Result<Self, NilaIsbError> {
        self.jwks_url = Some(parse_url(url)?);
        Ok(self)
    }

    /// Sets the UI locale hint. Defaults to an empty string.
    pub fn locales(mut self, locales: impl Into<String>) -> Self {
        self.locales = Some(locales.into());
        self
    }

    /// Asks the broker to prompt the user for consent.
    pub fn prompt_consent(mut self, prompt: bool) -> Self {
        self.prompt_consent = prompt;
        self
    }

    /// Sets the client assertion lifetime. Defaults to 600 seconds.
    pub fn assertion_lifetime(mut self, lifetime: Duration) -> Self {
        self.assertion_lifetime = Some(lifetime);
        self
    }

    /// Sets the minimum interval between key set fetches. Defaults to 5 minutes.
    pub fn key_cache_interval(mut self, interval: Duration) -> Self {
        self.key_cache_interval = Some(interval);
        self
    }

    /// Sets the HTTP timeout. Defaults to 15 seconds.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Sets the random byte length of nonce and state. Defaults to 32.
    pub fn token_length(mut self, length: usize) -> Self {
        self.token_length = Some(length);
        self
    }

    /// Sets the allowed signing algorithms.
    /// Defaults to `[Algorithm::RS256]` if not set.
    pub fn algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.validation.algorithms = algorithms;
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing, if an algorithm outside the
    /// RSA family is allowed, or if the token length is zero.
    pub fn build(self) -> Result<Config, NilaIsbError> {
        let missing = |field: &str| NilaIsbError::MissingConfiguration(field.to_string());

        let client_id = self.client_id.filter(|id| !id.is_empty()).ok_or_else(|| missing("client_id"))?;
        let scope = self.scope.ok_or_else(|| missing("scope"))?;
        let authorize_url = self.authorize_url.ok_or_else(|| missing("authorize_url"))?;
        let token_url = self.token_url.ok_or_else(|| missing("token_url"))?;
        let callback_url = self.callback_url.ok_or_else(|| missing("callback_url"))?;
        let jwks_url = self.jwks_url.ok_or_else(|| missing("jwks_url"))?;

        if self.validation.algorithms.is_empty() {
            return Err(NilaIsbError::InvalidConfiguration(
                "at least one signing algorithm must be allowed".to_string(),
            ));
        }
        if let Some(alg) = self.validation.algorithms.iter().find(|alg| !is_rsa(**alg)) {
            return Err(NilaIsbError::InvalidConfiguration(format!(
                "algorithm {alg:?} is not an RSA signature algorithm"
            )));
        }

        let token_length = self.token_length.unwrap_or(DEFAULT_TOKEN_LENGTH);
        if token_length == 0 {
            return Err(NilaIsbError::InvalidConfiguration(
                "token_length must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            client_id,
            scope,
            authorize_url,
            token_url,
            callback_url,
            jwks_url,
            locales: self.locales.unwrap_or_default(),
            prompt_consent: self.prompt_consent,
            assertion_lifetime: self
                .assertion_lifetime
                .unwrap_or(Duration::from_secs(DEFAULT_ASSERTION_LIFETIME_SECS)),
            key_cache_interval: self.key_cache_interval.unwrap_or(DEFAULT_KEY_CACHE_INTERVAL),
            http_timeout: self.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT),
            token_length,
            validation: self.validation,
        })
    }
}

fn is_rsa(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
    )
}

/// File representation of [`Config`], e.g. loaded from YAML.
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub client_id: String,
    pub scope: String,
    pub authorize_url: String,
    pub token_url: String,
    pub callback_url: String,
    pub jwks_url: String,
    #[serde(default)]
    pub locales: String,
    #[serde(default)]
    pub prompt_consent: bool,
    pub assertion_lifetime_seconds: Option<u64>,
    pub key_cache_interval_seconds: Option<u64>,
    pub http_timeout_seconds: Option<u64>,
    pub token_length: Option<usize>,
    pub algorithms: Option<Vec<Algorithm>>,
}

impl TryFrom<Settings> for Config {
    type Error = NilaIsbError;

    fn try_from(settings: Settings) -> Result<Self, Self::Error> {
        let mut builder = ConfigBuilder::new()
            .client_id(settings.client_id)
            .scope(settings.scope)
            .authorize_url(&settings.authorize_url)?
            .token_url(&settings.token_url)?
            .callback_url(&settings.callback_url)?
            .jwks_url(&settings.jwks_url)?
            .locales(settings.locales)
            .prompt_consent(settings.prompt_consent);

        if let Some(secs) = settings.assertion_lifetime_seconds {
            builder = builder.assertion_lifetime(Duration::from_secs(secs));
        }
        if let Some(secs) = settings.key_cache_interval_seconds {
            builder = builder.key_cache_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = settings.http_timeout_seconds {
            builder = builder.http_timeout(Duration::from_secs(secs));
        }
        if let Some(length) = settings.token_length {
            builder = builder.token_length(length);
        }
        if let Some(algorithms) = settings.algorithms {
            builder = builder.algorithms(algorithms);
        }
        builder.build()
    }
}
