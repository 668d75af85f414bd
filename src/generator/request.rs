// src/generator/request.rs

use super::sign_json;
use crate::config::Config;
use crate::error::NilaIsbError;
use crate::keys::SigningKey;
use serde::{Deserialize, Serialize};

const RESPONSE_TYPE_CODE: &str = "code";
const PROMPT_CONSENT: &str = "consent";

/// The request object sent to the broker's authorize endpoint.
///
/// Field order is the JSON claim order of the signed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub scope: String,
    pub redirect_uri: String,
    /// Always `code`.
    pub response_type: String,
    /// Echoed back in the identity token.
    pub nonce: String,
    /// Echoed back on the callback.
    pub state: String,
    pub ui_locales: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl AuthorizationRequest {
    /// Builds the request for `config` with the given nonce and state.
    pub fn new(config: &Config, nonce: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            client_id: config.client_id.clone(),
            scope: config.scope.clone(),
            redirect_uri: config.callback_url.to_string(),
            response_type: RESPONSE_TYPE_CODE.to_string(),
            nonce: nonce.into(),
            state: state.into(),
            ui_locales: config.locales.clone(),
            prompt: config.prompt_consent.then(|| PROMPT_CONSENT.to_string()),
        }
    }

    /// Signs the JSON form of the request.
    pub fn sign(&self, key: &SigningKey) -> Result<String, NilaIsbError> {
        sign_json(self, key)
    }
}
