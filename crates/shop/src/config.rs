//! Configuration shared by the storefront, admin and CLI binaries.
//!
//! # Environment Variables
//!
//! ## M-Pesa (required by the storefront and `cli payments reconcile`)
//! - `MPESA_CONSUMER_KEY` / `MPESA_CONSUMER_SECRET` - Daraja app credentials
//! - `MPESA_SHORTCODE` - Paybill business short code
//! - `MPESA_PASSKEY` - Lipa na M-Pesa Online passkey
//! - `MPESA_CALLBACK_URL` - Public URL of `POST /mpesa/callback`
//! - `MPESA_ENVIRONMENT` - `sandbox` (default) or `production`
//! - `MPESA_BASE_URL` - Override the Daraja base URL (tests, proxies)
//! - `MPESA_CALLBACK_TOKEN` - Optional shared secret expected in the callback `token` query parameter
//!
//! ## Orders (optional)
//! - `DELIVERY_FEE_FOOD` - Delivery fee for food orders (default: 20)
//! - `DELIVERY_FEE_LIQUOR` - Delivery fee for liquor orders (default: 30)
//! - `PAID_ORDER_STATUS` - Fulfillment status once paid: `preparing` (default) or `pending`
//!
//! ## Email (optional; notifications are only logged without `SMTP_HOST`)
//! - `SMTP_HOST`, `SMTP_PORT` (default: 587), `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`
//! - `STAFF_NOTIFICATION_EMAIL` - Mailbox told about new and paid orders

use std::collections::HashMap;
use std::str::FromStr;

use chrono::TimeDelta;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use campus_eats_core::{Category, FulfillmentStatus};

use crate::mpesa::{MpesaConfig, MpesaEnvironment};

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Pricing and lifecycle policy for orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSettings {
    pub delivery_fee_food: Decimal,
    pub delivery_fee_liquor: Decimal,
    /// Fulfillment status a pending order moves to once its payment completes.
    pub paid_order_status: FulfillmentStatus,
    /// Added to the placement time to get the estimated delivery time.
    pub delivery_estimate: TimeDelta,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            delivery_fee_food: Decimal::from(20),
            delivery_fee_liquor: Decimal::from(30),
            paid_order_status: FulfillmentStatus::Preparing,
            delivery_estimate: TimeDelta::minutes(30),
        }
    }
}

impl OrderSettings {
    /// Load order settings, falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for unparseable fees or a paid
    /// status other than `pending`/`preparing`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let delivery_fee_food = get_fee("DELIVERY_FEE_FOOD", defaults.delivery_fee_food)?;
        let delivery_fee_liquor = get_fee("DELIVERY_FEE_LIQUOR", defaults.delivery_fee_liquor)?;

        let paid_order_status = match get_optional_env("PAID_ORDER_STATUS") {
            None => defaults.paid_order_status,
            Some(raw) => match FulfillmentStatus::from_str(raw.trim()) {
                Ok(status @ (FulfillmentStatus::Pending | FulfillmentStatus::Preparing)) => status,
                _ => {
                    return Err(ConfigError::InvalidEnvVar(
                        "PAID_ORDER_STATUS".to_string(),
                        format!("expected 'pending' or 'preparing', got '{raw}'"),
                    ));
                }
            },
        };

        Ok(Self {
            delivery_fee_food,
            delivery_fee_liquor,
            paid_order_status,
            delivery_estimate: defaults.delivery_estimate,
        })
    }

    /// Delivery fee charged for a cart of the given category.
    #[must_use]
    pub const fn delivery_fee(&self, category: Category) -> Decimal {
        match category {
            Category::Food => self.delivery_fee_food,
            Category::Liquor => self.delivery_fee_liquor,
        }
    }
}

fn get_fee(key: &str, default: Decimal) -> Result<Decimal, ConfigError> {
    let Some(raw) = get_optional_env(key) else {
        return Ok(default);
    };
    let fee = Decimal::from_str(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if fee.is_sign_negative() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(fee)
}

impl MpesaConfig {
    /// Load Daraja credentials and endpoints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or
    /// `MPESA_ENVIRONMENT` is not `sandbox`/`production`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = get_env_or_default("MPESA_ENVIRONMENT", "sandbox")
            .parse::<MpesaEnvironment>()
            .map_err(|e| ConfigError::InvalidEnvVar("MPESA_ENVIRONMENT".to_string(), e))?;
        let base_url = get_optional_env("MPESA_BASE_URL")
            .unwrap_or_else(|| environment.base_url().to_string());
        let callback_url = get_required_env("MPESA_CALLBACK_URL")?;
        validate_url("MPESA_CALLBACK_URL", &callback_url)?;
        validate_url("MPESA_BASE_URL", &base_url)?;

        Ok(Self {
            consumer_key: get_required_secret("MPESA_CONSUMER_KEY")?,
            consumer_secret: get_required_secret("MPESA_CONSUMER_SECRET")?,
            shortcode: get_required_env("MPESA_SHORTCODE")?,
            passkey: get_required_secret("MPESA_PASSKEY")?,
            callback_url,
            environment,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// The provider only calls back to absolute http(s) URLs.
fn validate_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(name.to_string(), e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            name.to_string(),
            format!("unsupported scheme {}", parsed.scheme()),
        ));
    }
    Ok(())
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
    /// Staff mailbox for new-order alerts
    pub staff_address: Option<String>,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .field("staff_address", &self.staff_address)
            .finish()
    }
}

impl EmailConfig {
    /// Load SMTP settings. Returns `None` when `SMTP_HOST` is unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `SMTP_HOST` is set but the rest is incomplete.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };
        let smtp_port = get_env_or_default("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;

        Ok(Some(Self {
            smtp_host,
            smtp_port,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_validated_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("SMTP_FROM")?,
            staff_address: get_optional_env("STAFF_NOTIFICATION_EMAIL"),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if the variable is unset.
pub fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if the variable is unset.
pub fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` naming `primary_key` if neither is set.
pub fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
#[must_use]
pub fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
#[must_use]
pub fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a session secret meets minimum length requirements.
///
/// # Errors
///
/// Returns `ConfigError::InsecureSecret` if the secret is too short.
pub fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
///
/// # Errors
///
/// Returns `ConfigError` if the variable is missing, looks like a
/// placeholder, or has too little entropy.
pub fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("X", "https://eats.example.ke/mpesa/callback").is_ok());
        assert!(validate_url("X", "http://127.0.0.1:8080").is_ok());
        assert!(matches!(
            validate_url("X", "ftp://eats.example.ke"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert!(matches!(
            validate_url("X", "/mpesa/callback"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!(shannon_entropy("").abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("abababab");
        assert!((entropy - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-session-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("k8Hq2mNx7Rv4Lp9Wz3Ty6Bc1Df5Gj0Sa", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        let result = validate_session_secret(&secret, "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_delivery_fee_by_category() {
        let settings = OrderSettings::default();
        assert_eq!(settings.delivery_fee(Category::Food), Decimal::from(20));
        assert_eq!(settings.delivery_fee(Category::Liquor), Decimal::from(30));
        assert_eq!(settings.paid_order_status, FulfillmentStatus::Preparing);
        assert_eq!(settings.delivery_estimate, TimeDelta::minutes(30));
    }

    #[test]
    fn test_email_config_debug_redacts_secrets() {
        let config = EmailConfig {
            smtp_host: "smtp.campus.test".to_string(),
            smtp_port: 587,
            smtp_username: "orders".to_string(),
            smtp_password: SecretString::from("hunter2-smtp"),
            from_address: "orders@campus.test".to_string(),
            staff_address: None,
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2-smtp"));
    }
}
