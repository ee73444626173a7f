//! Stale M-Pesa payment reconciliation.
//!
//! An STK push can be answered on the customer's phone while the callback
//! never arrives. This asks Daraja for each order still `processing` after
//! the cutoff and settles it through the normal reconciliation path.

use std::sync::Arc;

use chrono::TimeDelta;
use thiserror::Error;

use campus_eats_shop::OrderError;
use campus_eats_shop::config::{ConfigError, EmailConfig, OrderSettings};
use campus_eats_shop::db::PgShopRepository;
use campus_eats_shop::mpesa::{GatewayError, MpesaClient, MpesaConfig};
use campus_eats_shop::notify::{SmtpError, build_notifier};
use campus_eats_shop::services::{CustomerLocks, OrderService};

use super::{CommandError, connect};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("M-Pesa client error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("email error: {0}")]
    Email(#[from] SmtpError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("--older-than-minutes cannot be negative")]
    NegativeAge,
}

pub async fn reconcile(older_than_minutes: i64) -> Result<(), ReconcileError> {
    if older_than_minutes < 0 {
        return Err(ReconcileError::NegativeAge);
    }

    let pool = connect().await?;
    let gateway = MpesaClient::new(MpesaConfig::from_env()?)?;
    let notifier = build_notifier(EmailConfig::from_env()?.as_ref(), &pool)?;

    let orders = OrderService::new(
        Arc::new(PgShopRepository::new(pool)),
        Arc::new(gateway),
        notifier,
        OrderSettings::from_env()?,
        CustomerLocks::new(),
    );

    let report = orders
        .reconcile_stale_payments(TimeDelta::minutes(older_than_minutes))
        .await?;

    tracing::info!("Checked: {}", report.checked);
    tracing::info!("  Confirmed: {}", report.confirmed);
    tracing::info!("  Failed: {}", report.failed);
    tracing::info!("  Still pending: {}", report.still_pending);
    tracing::info!("  Errors: {}", report.errors);
    Ok(())
}
