//! M-Pesa Daraja integration (Lipa na M-Pesa Online / STK push).
//!
//! # Architecture
//!
//! - [`PaymentGateway`] is the seam the order coordinator depends on
//! - [`MpesaClient`] implements it against the Daraja REST API
//! - OAuth access tokens are cached on the client and refreshed 60 s early
//! - [`callback`] parses the asynchronous result Safaricom posts back
//!
//! Initiation never fails past the gateway boundary: transport and credential
//! problems come back as [`PaymentInitiation::Rejected`] with a readable reason.

pub mod auth;
pub mod callback;
pub mod client;

pub use auth::AccessToken;
pub use callback::{CallbackError, CallbackReceipt, StkCallbackEnvelope};
pub use client::MpesaClient;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use campus_eats_core::PhoneNumber;

/// Error code Daraja answers an STK query with while the push is outstanding.
pub const PENDING_ERROR_CODE: &str = "500.001.1001";

/// Errors that can occur when talking to Daraja.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Could not obtain an access token.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Daraja returned an error body.
    #[error("M-Pesa error {code}: {message}")]
    Api { code: String, message: String },

    /// Response did not have the expected shape.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Which Daraja deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MpesaEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    #[must_use]
    pub const fn base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.safaricom.co.ke",
            Self::Production => "https://api.safaricom.co.ke",
        }
    }
}

impl FromStr for MpesaEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" | "live" => Ok(Self::Production),
            other => Err(format!("expected 'sandbox' or 'production', got '{other}'")),
        }
    }
}

impl fmt::Display for MpesaEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        })
    }
}

/// Daraja credentials and endpoints.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct MpesaConfig {
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    /// Paybill short code; also the STK `PartyB`.
    pub shortcode: String,
    pub passkey: SecretString,
    pub callback_url: String,
    pub environment: MpesaEnvironment,
    /// Base URL without a trailing slash.
    pub base_url: String,
}

impl fmt::Debug for MpesaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpesaConfig")
            .field("consumer_key", &"[REDACTED]")
            .field("consumer_secret", &"[REDACTED]")
            .field("shortcode", &self.shortcode)
            .field("passkey", &"[REDACTED]")
            .field("callback_url", &self.callback_url)
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Result of asking the provider to push a payment prompt to a phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentInitiation {
    /// The prompt was sent. `checkout_request_id` correlates the later result.
    Accepted {
        checkout_request_id: String,
        customer_message: String,
    },
    /// The prompt was not sent.
    Rejected { reason: String },
}

/// Where a payment stands according to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed { reason: String },
    /// The customer has not answered the prompt yet.
    Pending,
}

/// Final result of a payment, from a callback or a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentResult {
    /// Status queries do not carry the receipt number; callbacks always do.
    Succeeded { receipt_number: Option<String> },
    Failed { reason: String },
}

/// Answer to an STK status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStatusReport {
    pub result_code: Option<i64>,
    pub result_description: String,
    pub outcome: PaymentOutcome,
}

/// Mobile-money payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Push a payment prompt for `amount` to `phone`.
    ///
    /// `reference` is shown to the customer and echoed back by the provider;
    /// `description` is a short label for the payment.
    async fn initiate_payment(
        &self,
        phone: &PhoneNumber,
        amount: Decimal,
        reference: &str,
        description: &str,
    ) -> PaymentInitiation;

    /// Ask the provider for the current result of a previously accepted push.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` on transport, credential or protocol failure.
    async fn query_payment_status(
        &self,
        checkout_request_id: &str,
    ) -> Result<PaymentStatusReport, GatewayError>;
}

/// Daraja sends some numeric fields as JSON numbers in one response and as
/// strings in another (`ResultCode`, `expires_in`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum NumberOrString {
    Number(i64),
    Text(String),
}

impl NumberOrString {
    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for NumberOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}
