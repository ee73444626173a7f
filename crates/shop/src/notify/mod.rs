//! Order lifecycle notifications.
//!
//! The order service emits an [`OrderEvent`] after each committed transition.
//! Sinks are fire-and-forget: `notify` returns immediately and delivery
//! failures are logged, never surfaced to the operation that caused them.

mod email;

pub use email::{EmailError, EmailNotifier, EmailService};

use std::sync::Arc;

use campus_eats_core::FulfillmentStatus;
pub use lettre::transport::smtp::Error as SmtpError;
use sqlx::PgPool;
use tracing::info;

use crate::config::EmailConfig;
use crate::models::Order;
use crate::services::CancelledBy;

/// A committed order transition.
#[derive(Debug, Clone)]
pub enum OrderEvent {
    OrderPlaced(Order),
    PaymentConfirmed(Order),
    PaymentFailed(Order),
    StatusChanged {
        order: Order,
        from: FulfillmentStatus,
    },
    OrderCancelled {
        order: Order,
        by: CancelledBy,
    },
}

impl OrderEvent {
    #[must_use]
    pub const fn order(&self) -> &Order {
        match self {
            Self::OrderPlaced(order)
            | Self::PaymentConfirmed(order)
            | Self::PaymentFailed(order)
            | Self::StatusChanged { order, .. }
            | Self::OrderCancelled { order, .. } => order,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderPlaced(_) => "order_placed",
            Self::PaymentConfirmed(_) => "payment_confirmed",
            Self::PaymentFailed(_) => "payment_failed",
            Self::StatusChanged { .. } => "status_changed",
            Self::OrderCancelled { .. } => "order_cancelled",
        }
    }

    /// Whether staff should hear about this event.
    #[must_use]
    pub const fn alerts_staff(&self) -> bool {
        matches!(self, Self::OrderPlaced(_) | Self::PaymentConfirmed(_))
    }
}

/// Receives order events.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: OrderEvent);
}

/// Writes events to the log. Used when SMTP is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, event: OrderEvent) {
        let order = event.order();
        info!(
            event = event.kind(),
            order_number = %order.order_number,
            customer_id = %order.customer_id,
            status = %order.status,
            payment_status = %order.payment_status,
            "Order notification"
        );
    }
}

/// Email notifications when SMTP is configured, log lines otherwise.
///
/// # Errors
///
/// Returns `SmtpError` if the SMTP relay settings are invalid.
pub fn build_notifier(
    email: Option<&EmailConfig>,
    pool: &PgPool,
) -> Result<Arc<dyn NotificationSink>, SmtpError> {
    let Some(config) = email else {
        info!("SMTP not configured, order notifications will only be logged");
        return Ok(Arc::new(LogNotifier));
    };

    let service = EmailService::new(config)?;
    info!(host = %config.smtp_host, "Email notifications enabled");
    Ok(Arc::new(EmailNotifier::new(
        service,
        pool.clone(),
        config.staff_address.clone(),
    )))
}
