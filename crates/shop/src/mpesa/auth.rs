//! Daraja OAuth client-credentials flow.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use super::{GatewayError, MpesaConfig, NumberOrString};

/// Lifetime Daraja documents for its access tokens, used when the response omits it.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3599;

/// Refresh this many seconds before the token actually expires.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// OAuth access token for the Daraja API.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: SecretString,
    /// Unix timestamp when the token expires.
    pub expires_at: i64,
}

impl AccessToken {
    /// Check if the token has expired or is about to.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        now >= self.expires_at - EXPIRY_BUFFER_SECS
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<NumberOrString>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Obtain a new access token using the app's consumer key and secret.
///
/// # Errors
///
/// Returns `GatewayError::AuthenticationFailed` if Daraja rejects the credentials.
#[instrument(skip_all, fields(base_url = %config.base_url))]
pub async fn fetch_access_token(
    client: &reqwest::Client,
    config: &MpesaConfig,
) -> Result<AccessToken, GatewayError> {
    let now = chrono::Utc::now().timestamp();

    let response = client
        .get(format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            config.base_url
        ))
        .basic_auth(
            config.consumer_key.expose_secret(),
            Some(config.consumer_secret.expose_secret()),
        )
        .send()
        .await?;

    let status = response.status();

    if status.is_success() {
        let body: TokenResponse = response.json().await?;
        let lifetime = body
            .expires_in
            .as_ref()
            .and_then(NumberOrString::as_i64)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

        Ok(AccessToken {
            access_token: SecretString::from(body.access_token),
            expires_at: now + lifetime,
        })
    } else {
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .ok()
            .and_then(|e| e.error_message.or(e.error_description))
            .unwrap_or(text);

        Err(GatewayError::AuthenticationFailed(format!(
            "HTTP {status}: {message}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_expired() {
        let now = chrono::Utc::now().timestamp();

        let expired = AccessToken {
            access_token: SecretString::from("test"),
            expires_at: now - 3600,
        };
        assert!(expired.is_expired());

        let valid = AccessToken {
            access_token: SecretString::from("test"),
            expires_at: now + DEFAULT_TOKEN_LIFETIME_SECS,
        };
        assert!(!valid.is_expired());

        // Inside the 60 s refresh buffer
        let almost = AccessToken {
            access_token: SecretString::from("test"),
            expires_at: now + 30,
        };
        assert!(almost.is_expired());
    }
}
