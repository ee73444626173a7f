//! Human-readable order numbers.

use core::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`OrderNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderNumberError {
    #[error("order number must be {expected} characters")]
    WrongLength { expected: usize },
    #[error("order number must start with {0}")]
    WrongPrefix(&'static str),
    #[error("order number has an invalid date stamp")]
    InvalidDate,
    #[error("order number suffix must be uppercase hexadecimal")]
    InvalidSuffix,
}

/// An order number such as `CE20260314A1B2C3`.
///
/// Layout: the `CE` store prefix, the `YYYYMMDD` UTC placement date, and six
/// random uppercase hex characters. The suffix gives 16.7 million numbers per
/// day; the store still enforces uniqueness and a collision is retried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    pub const PREFIX: &'static str = "CE";
    const DATE_LEN: usize = 8;
    const SUFFIX_LEN: usize = 6;
    const LEN: usize = Self::PREFIX.len() + Self::DATE_LEN + Self::SUFFIX_LEN;

    /// Generate a fresh order number stamped with `placed_at`.
    #[must_use]
    pub fn generate(placed_at: DateTime<Utc>) -> Self {
        let suffix: u32 = rand::rng().random_range(0..0x100_0000);

        Self(format!(
            "{}{}{suffix:06X}",
            Self::PREFIX,
            placed_at.format("%Y%m%d")
        ))
    }

    /// Parse an order number received from a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the input does not have the generated layout.
    pub fn parse(s: &str) -> Result<Self, OrderNumberError> {
        let s = s.trim();
        if s.len() != Self::LEN || !s.is_ascii() {
            return Err(OrderNumberError::WrongLength { expected: Self::LEN });
        }

        let rest = s
            .strip_prefix(Self::PREFIX)
            .ok_or(OrderNumberError::WrongPrefix(Self::PREFIX))?;
        let (date, suffix) = rest.split_at(Self::DATE_LEN);

        NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| OrderNumberError::InvalidDate)?;

        if !suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        {
            return Err(OrderNumberError::InvalidSuffix);
        }

        Ok(Self(s.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = OrderNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

// Stored as TEXT. Values read back were generated by us, so decoding skips
// validation.
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrderNumber {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderNumber {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrderNumber {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
