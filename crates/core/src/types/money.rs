//! Decimal money helpers.
//!
//! Amounts are Kenyan shillings held in [`rust_decimal::Decimal`]. These
//! helpers cover the two places an amount has to become an integer: loyalty
//! crediting and the whole-shilling amount sent to the payment provider.

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

/// Loyalty points earned for an order total: one point per shilling,
/// rounded half away from zero.
#[must_use]
pub fn loyalty_points_for(total: Decimal) -> i64 {
    total
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
        .max(0)
}

/// Whole-shilling amount to request from the payment provider.
///
/// Fractions are rounded up so the customer never underpays, and the result
/// is never below 1 because the provider rejects zero-value pushes.
#[must_use]
pub fn payable_whole_units(amount: Decimal) -> i64 {
    amount.ceil().to_i64().unwrap_or(1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_loyalty_points_rounds_half_up() {
        assert_eq!(loyalty_points_for(dec!(270)), 270);
        assert_eq!(loyalty_points_for(dec!(99.5)), 100);
        assert_eq!(loyalty_points_for(dec!(99.49)), 99);
    }

    #[test]
    fn test_loyalty_points_never_negative() {
        assert_eq!(loyalty_points_for(dec!(-5)), 0);
    }

    #[test]
    fn test_payable_amount_rounds_up() {
        assert_eq!(payable_whole_units(dec!(270)), 270);
        assert_eq!(payable_whole_units(dec!(270.01)), 271);
    }

    #[test]
    fn test_payable_amount_minimum_is_one() {
        assert_eq!(payable_whole_units(dec!(0)), 1);
        assert_eq!(payable_whole_units(dec!(0.2)), 1);
    }
}
