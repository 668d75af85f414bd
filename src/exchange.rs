// src/exchange.rs

use crate::error::NilaIsbError;
use crate::generator::AssertionSigner;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";
const CLIENT_ASSERTION_TYPE_JWT_BEARER: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// The token endpoint response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccessResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    /// The encrypted and signed identity token.
    #[serde(default)]
    pub id_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

#[derive(Serialize)]
struct TokenRequestForm<'a> {
    code: &'a str,
    grant_type: &'a str,
    client_assertion_type: &'a str,
    client_assertion: &'a str,
}

/// Exchanges authorization codes for tokens at the broker's token endpoint.
///
/// Every call makes exactly one request; retries are left to the caller.
#[derive(Clone)]
pub struct TokenExchanger {
    http_client: reqwest::Client,
    token_url: Url,
    signer: AssertionSigner,
}

impl TokenExchanger {
    pub fn new(token_url: Url, signer: AssertionSigner, timeout: Duration) -> Result<Self, NilaIsbError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NilaIsbError::Transport)?;
        Ok(Self::with_client(http_client, token_url, signer))
    }

    pub fn with_client(http_client: reqwest::Client, token_url: Url, signer: AssertionSigner) -> Self {
        Self {
            http_client,
            token_url,
            signer,
        }
    }

    /// Posts `authorization_code` with a freshly minted client assertion.
    #[instrument(level = "debug", skip_all, fields(url = %self.token_url))]
    pub async fn exchange(&self, authorization_code: &str) -> Result<AccessResponse, NilaIsbError> {
        let client_assertion = self.signer.sign(Uuid::new_v4().to_string())?;
        let form = TokenRequestForm {
            code: authorization_code,
            grant_type: GRANT_TYPE_AUTHORIZATION_CODE,
            client_assertion_type: CLIENT_ASSERTION_TYPE_JWT_BEARER,
            client_assertion: &client_assertion,
        };

        let response = self
            .http_client
            .post(self.token_url.clone())
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(NilaIsbError::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!("Token endpoint returned {}", status);
            return Err(NilaIsbError::TokenEndpoint { status: status.as_u16() });
        }

        let body = response.bytes().await.map_err(NilaIsbError::Transport)?;
        serde_json::from_slice(&body).map_err(|e| NilaIsbError::ResponseFormat(e.to_string()))
    }
}
