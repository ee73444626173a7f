//! M-Pesa payment endpoints.
//!
//! The callback is the provider's push notification of an STK result; the
//! query endpoint is the customer's pull. Both feed the same idempotent
//! reconciliation, so a payment is applied once however many of each arrive.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};

use campus_eats_core::{FulfillmentStatus, OrderNumber, PaymentStatus};
use campus_eats_shop::models::Order;
use campus_eats_shop::mpesa::StkCallbackEnvelope;
use campus_eats_shop::services::ReconcileOutcome;

use crate::error::{AppError, Result};
use crate::middleware::RequireCustomer;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentQueryForm {
    pub checkout_request_id: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub order_number: OrderNumber,
    pub payment_status: PaymentStatus,
    pub status: FulfillmentStatus,
    pub status_display: &'static str,
    pub mpesa_receipt_number: Option<String>,
    pub payment_failure_reason: Option<String>,
}

impl From<Order> for PaymentStatusResponse {
    fn from(order: Order) -> Self {
        Self {
            status_display: order.status.display_name(),
            order_number: order.order_number,
            payment_status: order.payment_status,
            status: order.status,
            mpesa_receipt_number: order.mpesa_receipt_number,
            payment_failure_reason: order.payment_failure_reason,
        }
    }
}

/// Ask the provider where a payment stands and apply a final answer.
///
/// Returns the order's payment state after the query. A provider outage
/// leaves it `processing`; the client keeps polling.
#[instrument(skip(state, customer, form), fields(customer_id = %customer.id))]
pub async fn query(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Json(form): Json<PaymentQueryForm>,
) -> Result<Json<PaymentStatusResponse>> {
    let checkout_request_id = form.checkout_request_id.trim();
    if checkout_request_id.is_empty() {
        return Err(AppError::BadRequest(
            "checkout_request_id is required".to_string(),
        ));
    }

    let order = state
        .orders()
        .poll_payment(customer.id, checkout_request_id)
        .await?;
    Ok(Json(order.into()))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub token: Option<String>,
}

/// Daraja's expected acknowledgement.
fn accepted() -> Json<Value> {
    Json(json!({ "ResultCode": 0, "ResultDesc": "Accepted" }))
}

/// Receive an STK push result.
///
/// Always acknowledges with 200: the provider retries anything else, and
/// nothing it could resend would fix a malformed payload or a store outage.
/// Problems are logged for follow-up instead.
#[instrument(skip_all)]
pub async fn mpesa_callback(
    State(state): State<AppState>,
    query: std::result::Result<Query<CallbackQuery>, QueryRejection>,
    body: Bytes,
) -> Json<Value> {
    if let Some(expected) = state.config().callback_token.as_ref() {
        let supplied = query.ok().and_then(|Query(q)| q.token);
        let authorised = supplied
            .as_deref()
            .is_some_and(|token| tokens_match(token, expected.expose_secret()));
        if !authorised {
            warn!("M-Pesa callback with missing or wrong token ignored");
            return accepted();
        }
    }

    let envelope: StkCallbackEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Malformed M-Pesa callback body");
            return accepted();
        }
    };

    let receipt = match envelope.into_receipt() {
        Ok(receipt) => receipt,
        Err(e) => {
            warn!(error = %e, "Invalid M-Pesa callback");
            return accepted();
        }
    };

    info!(
        checkout_request_id = %receipt.checkout_request_id,
        result_code = receipt.result_code,
        amount = ?receipt.metadata.amount,
        "M-Pesa callback received"
    );

    match state
        .orders()
        .reconcile_payment_result(&receipt.checkout_request_id, receipt.result)
        .await
    {
        Ok(ReconcileOutcome::Applied(order)) => {
            info!(
                order_number = %order.order_number,
                payment_status = %order.payment_status,
                "M-Pesa callback applied"
            );
        }
        Ok(ReconcileOutcome::NoOp(reason)) => {
            info!(?reason, "M-Pesa callback not applied");
        }
        Err(e) => {
            error!(
                checkout_request_id = %receipt.checkout_request_id,
                error = %e,
                "Failed to apply M-Pesa callback"
            );
        }
    }

    accepted()
}

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(supplied: &str, expected: &str) -> bool {
    supplied.len() == expected.len()
        && supplied
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cr3t-callback", "s3cr3t-callback"));
        assert!(!tokens_match("s3cr3t-callback", "s3cr3t-callbacK"));
        assert!(!tokens_match("short", "s3cr3t-callback"));
        assert!(!tokens_match("", "s3cr3t-callback"));
    }
}
