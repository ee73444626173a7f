//! Email notifications via SMTP with Askama text/HTML templates.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use campus_eats_core::{FulfillmentStatus, PaymentMethod};

use crate::config::EmailConfig;
use crate::db::AccountRepository;
use crate::models::Order;

use super::{NotificationSink, OrderEvent};

#[derive(Template)]
#[template(path = "email/order_update.html")]
struct OrderUpdateHtml<'a> {
    customer_name: &'a str,
    headline: &'a str,
    detail: Option<&'a str>,
    order_number: &'a str,
    status: &'a str,
    payment: &'a str,
    total: &'a str,
    hostel: &'a str,
    room_number: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_update.txt")]
struct OrderUpdateText<'a> {
    customer_name: &'a str,
    headline: &'a str,
    detail: Option<&'a str>,
    order_number: &'a str,
    status: &'a str,
    payment: &'a str,
    total: &'a str,
    hostel: &'a str,
    room_number: &'a str,
}

#[derive(Template)]
#[template(path = "email/staff_order_alert.html")]
struct StaffAlertHtml<'a> {
    headline: &'a str,
    order_number: &'a str,
    category: &'a str,
    payment: &'a str,
    total: &'a str,
    hostel: &'a str,
    room_number: &'a str,
    phone_number: &'a str,
    delivery_notes: &'a str,
}

#[derive(Template)]
#[template(path = "email/staff_order_alert.txt")]
struct StaffAlertText<'a> {
    headline: &'a str,
    order_number: &'a str,
    category: &'a str,
    payment: &'a str,
    total: &'a str,
    hostel: &'a str,
    room_number: &'a str,
    phone_number: &'a str,
    delivery_notes: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Tell a customer about a change to their order.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_update(
        &self,
        to: &str,
        customer_name: &str,
        event: &OrderEvent,
    ) -> Result<(), EmailError> {
        let order = event.order();
        let message = customer_message(event);
        let total = format!("{:.2}", order.total);
        let payment = payment_label(order);

        let html = OrderUpdateHtml {
            customer_name,
            headline: &message.headline,
            detail: message.detail.as_deref(),
            order_number: order.order_number.as_str(),
            status: order.status.display_name(),
            payment: &payment,
            total: &total,
            hostel: &order.hostel,
            room_number: &order.room_number,
        }
        .render()?;
        let text = OrderUpdateText {
            customer_name,
            headline: &message.headline,
            detail: message.detail.as_deref(),
            order_number: order.order_number.as_str(),
            status: order.status.display_name(),
            payment: &payment,
            total: &total,
            hostel: &order.hostel,
            room_number: &order.room_number,
        }
        .render()?;

        let subject = format!("{} ({})", message.headline, order.order_number);
        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Alert the staff mailbox about an order that needs preparing.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_staff_alert(&self, to: &str, event: &OrderEvent) -> Result<(), EmailError> {
        let order = event.order();
        let headline = match event {
            OrderEvent::PaymentConfirmed(_) => format!("Paid order {}", order.order_number),
            _ => format!("New order {}", order.order_number),
        };
        let total = format!("{:.2}", order.total);
        let payment = payment_label(order);

        let html = StaffAlertHtml {
            headline: &headline,
            order_number: order.order_number.as_str(),
            category: order.category.as_str(),
            payment: &payment,
            total: &total,
            hostel: &order.hostel,
            room_number: &order.room_number,
            phone_number: &order.phone_number,
            delivery_notes: &order.delivery_notes,
        }
        .render()?;
        let text = StaffAlertText {
            headline: &headline,
            order_number: order.order_number.as_str(),
            category: order.category.as_str(),
            payment: &payment,
            total: &total,
            hostel: &order.hostel,
            room_number: &order.room_number,
            phone_number: &order.phone_number,
            delivery_notes: &order.delivery_notes,
        }
        .render()?;

        self.send_multipart_email(to, &headline, &text, &html).await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Emails customers about their orders and staff about new work.
///
/// Each event is delivered on its own task; the customer's address is looked
/// up at send time.
#[derive(Clone)]
pub struct EmailNotifier {
    email: EmailService,
    pool: PgPool,
    staff_address: Option<String>,
}

impl EmailNotifier {
    #[must_use]
    pub const fn new(email: EmailService, pool: PgPool, staff_address: Option<String>) -> Self {
        Self {
            email,
            pool,
            staff_address,
        }
    }

    async fn deliver(&self, event: OrderEvent) {
        let order = event.order();

        match AccountRepository::new(&self.pool)
            .get_by_id(order.customer_id)
            .await
        {
            Ok(Some(customer)) => {
                if let Err(e) = self
                    .email
                    .send_order_update(customer.email.as_str(), &customer.name, &event)
                    .await
                {
                    warn!(error = %e, order_number = %order.order_number, "Failed to email customer");
                }
            }
            Ok(None) => {
                warn!(customer_id = %order.customer_id, "Customer missing for notification");
            }
            Err(e) => {
                warn!(error = %e, "Failed to load customer for notification");
            }
        }

        if let Some(staff) = self.staff_address.as_deref().filter(|_| event.alerts_staff()) {
            if let Err(e) = self.email.send_staff_alert(staff, &event).await {
                warn!(error = %e, order_number = %order.order_number, "Failed to email staff");
            }
        }
    }
}

impl NotificationSink for EmailNotifier {
    fn notify(&self, event: OrderEvent) {
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.deliver(event).await;
        });
    }
}

/// Customer-facing wording for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CustomerMessage {
    headline: String,
    detail: Option<String>,
}

fn customer_message(event: &OrderEvent) -> CustomerMessage {
    let order = event.order();
    let (headline, detail) = match event {
        OrderEvent::OrderPlaced(_) if order.payment_method == PaymentMethod::Mpesa => (
            "Your order is waiting for payment".to_string(),
            Some("Approve the M-Pesa prompt on your phone to confirm it.".to_string()),
        ),
        OrderEvent::OrderPlaced(_) => (
            "We've received your order".to_string(),
            Some("Please have cash ready for the rider.".to_string()),
        ),
        OrderEvent::PaymentConfirmed(_) => (
            "Payment received, your order is confirmed".to_string(),
            order
                .mpesa_receipt_number
                .as_ref()
                .map(|receipt| format!("M-Pesa receipt: {receipt}")),
        ),
        OrderEvent::PaymentFailed(_) => (
            "Your M-Pesa payment did not go through".to_string(),
            order.payment_failure_reason.clone(),
        ),
        OrderEvent::StatusChanged { .. } if order.status == FulfillmentStatus::Delivered => (
            "Your order has been delivered".to_string(),
            Some("Enjoy! You can rate your order from your order history.".to_string()),
        ),
        OrderEvent::StatusChanged { .. } => (
            format!("Your order is {}", order.status.display_name().to_lowercase()),
            None,
        ),
        OrderEvent::OrderCancelled { .. } => (
            "Your order was cancelled".to_string(),
            order.cancellation_reason.clone(),
        ),
    };
    CustomerMessage { headline, detail }
}

fn payment_label(order: &Order) -> String {
    match order.payment_method {
        PaymentMethod::Cash => "Cash on delivery".to_string(),
        PaymentMethod::Mpesa => format!("M-Pesa ({})", order.payment_status),
    }
}
