//! Daraja REST client for STK push and STK status queries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use campus_eats_core::{PhoneNumber, payable_whole_units};

use super::auth::{AccessToken, fetch_access_token};
use super::callback::failure_reason;
use super::{
    GatewayError, MpesaConfig, NumberOrString, PENDING_ERROR_CODE, PaymentGateway,
    PaymentInitiation, PaymentOutcome, PaymentStatusReport,
};

const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const STK_QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";
const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

/// Daraja timestamps are East Africa Time (UTC+3).
const EAT_OFFSET_HOURS: i64 = 3;

/// M-Pesa Daraja API client.
///
/// Cheap to clone; clones share the HTTP connection pool and token cache.
#[derive(Clone)]
pub struct MpesaClient {
    inner: Arc<MpesaClientInner>,
}

struct MpesaClientInner {
    http: reqwest::Client,
    config: MpesaConfig,
    /// In-memory token cache
    token: RwLock<Option<AccessToken>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushRequest<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: i64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryRequest<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: &'a str,
}

/// Union of the success and error bodies of the STK endpoints.
#[derive(Debug, Deserialize)]
struct DarajaResponse {
    #[serde(rename = "ResponseCode")]
    response_code: Option<NumberOrString>,
    #[serde(rename = "ResponseDescription")]
    response_description: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    #[serde(rename = "CustomerMessage")]
    customer_message: Option<String>,
    #[serde(rename = "ResultCode")]
    result_code: Option<NumberOrString>,
    #[serde(rename = "ResultDesc")]
    result_desc: Option<String>,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

impl MpesaClient {
    /// Create a new client. No request is made until the first payment.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Http` if the HTTP client cannot be built.
    pub fn new(config: MpesaConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(MpesaClientInner {
                http,
                config,
                token: RwLock::new(None),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &MpesaConfig {
        &self.inner.config
    }

    /// Return a valid access token, fetching a new one if the cached token
    /// is missing or about to expire.
    async fn access_token(&self) -> Result<SecretString, GatewayError> {
        {
            let cached = self.inner.token.read().await;
            if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
                return Ok(token.access_token.clone());
            }
        }

        let mut cached = self.inner.token.write().await;
        // Another request may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.access_token.clone());
        }

        debug!("Fetching new M-Pesa access token");
        let token = fetch_access_token(&self.inner.http, &self.inner.config).await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn invalidate_token(&self) {
        *self.inner.token.write().await = None;
    }

    /// Password and timestamp pair for an STK request made at `now`.
    fn credentials(&self, now: DateTime<Utc>) -> (String, String) {
        let timestamp = daraja_timestamp(now);
        let password = stk_password(
            &self.inner.config.shortcode,
            &self.inner.config.passkey,
            &timestamp,
        );
        (password, timestamp)
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(StatusCode, DarajaResponse), GatewayError> {
        let token = self.access_token().await?;

        let response = self
            .inner
            .http
            .post(format!("{}{path}", self.inner.config.base_url))
            .bearer_auth(token.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
        }

        let text = response.text().await?;
        match serde_json::from_str::<DarajaResponse>(&text) {
            Ok(parsed) => Ok((status, parsed)),
            Err(_) if status.is_success() => Err(GatewayError::UnexpectedResponse(format!(
                "unparseable body from {path}"
            ))),
            Err(_) => Err(GatewayError::Api {
                code: status.as_u16().to_string(),
                message: truncate(&text, 200),
            }),
        }
    }

    /// Send the STK push request.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` on transport or credential failure, or if
    /// Daraja refuses the push.
    #[instrument(skip(self, phone, description))]
    pub async fn stk_push(
        &self,
        phone: &PhoneNumber,
        amount: Decimal,
        reference: &str,
        description: &str,
    ) -> Result<(String, String), GatewayError> {
        let config = &self.inner.config;
        let (password, timestamp) = self.credentials(Utc::now());

        let request = StkPushRequest {
            business_short_code: &config.shortcode,
            password,
            timestamp,
            transaction_type: TRANSACTION_TYPE,
            amount: payable_whole_units(amount),
            party_a: phone.as_str(),
            party_b: &config.shortcode,
            phone_number: phone.as_str(),
            callback_url: &config.callback_url,
            account_reference: reference,
            transaction_desc: description,
        };

        let (status, response) = self.post(STK_PUSH_PATH, &request).await?;

        let accepted = status.is_success()
            && response.response_code.as_ref().and_then(NumberOrString::as_i64) == Some(0);

        match response.checkout_request_id {
            Some(checkout_request_id) if accepted => Ok((
                checkout_request_id,
                response
                    .customer_message
                    .unwrap_or_else(|| "Check your phone to complete payment".to_string()),
            )),
            _ => Err(GatewayError::Api {
                code: response
                    .error_code
                    .or_else(|| response.response_code.map(|c| c.to_string()))
                    .unwrap_or_else(|| status.as_u16().to_string()),
                message: response
                    .response_description
                    .or(response.error_message)
                    .unwrap_or_else(|| "STK push failed".to_string()),
            }),
        }
    }
}

#[async_trait]
impl PaymentGateway for MpesaClient {
    async fn initiate_payment(
        &self,
        phone: &PhoneNumber,
        amount: Decimal,
        reference: &str,
        description: &str,
    ) -> PaymentInitiation {
        match self.stk_push(phone, amount, reference, description).await {
            Ok((checkout_request_id, customer_message)) => PaymentInitiation::Accepted {
                checkout_request_id,
                customer_message,
            },
            Err(e) => {
                warn!(error = %e, reference = %reference, "STK push rejected");
                let reason = match e {
                    GatewayError::Api { message, .. } => message,
                    other => other.to_string(),
                };
                PaymentInitiation::Rejected { reason }
            }
        }
    }

    #[instrument(skip(self))]
    async fn query_payment_status(
        &self,
        checkout_request_id: &str,
    ) -> Result<PaymentStatusReport, GatewayError> {
        let (password, timestamp) = self.credentials(Utc::now());
        let request = StkQueryRequest {
            business_short_code: &self.inner.config.shortcode,
            password,
            timestamp,
            checkout_request_id,
        };

        let (status, response) = self.post(STK_QUERY_PATH, &request).await?;

        if response.error_code.as_deref() == Some(PENDING_ERROR_CODE) {
            return Ok(PaymentStatusReport {
                result_code: None,
                result_description: response
                    .error_message
                    .unwrap_or_else(|| "The transaction is being processed".to_string()),
                outcome: PaymentOutcome::Pending,
            });
        }

        if let Some(raw) = response.result_code {
            let code = raw
                .as_i64()
                .ok_or_else(|| GatewayError::UnexpectedResponse(format!("ResultCode {raw}")))?;
            let description = response.result_desc.unwrap_or_default();
            let outcome = if code == 0 {
                PaymentOutcome::Succeeded
            } else {
                PaymentOutcome::Failed {
                    reason: failure_reason(code, &description),
                }
            };
            return Ok(PaymentStatusReport {
                result_code: Some(code),
                result_description: description,
                outcome,
            });
        }

        Err(GatewayError::Api {
            code: response
                .error_code
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: response
                .error_message
                .or(response.response_description)
                .unwrap_or_else(|| "STK query failed".to_string()),
        })
    }
}

/// `YYYYMMDDHHMMSS` in East Africa Time.
fn daraja_timestamp(now: DateTime<Utc>) -> String {
    (now + TimeDelta::hours(EAT_OFFSET_HOURS))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// base64(shortcode + passkey + timestamp)
fn stk_password(shortcode: &str, passkey: &SecretString, timestamp: &str) -> String {
    BASE64.encode(format!(
        "{shortcode}{}{timestamp}",
        passkey.expose_secret()
    ))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
