//! Lenient money parsing and display formatting.
//!
//! The commerce backend transmits every monetary amount as a decimal string
//! (`"25.00"`, `"-1.50"`). Amounts are parsed with [`parse_amount`], which
//! never fails: a missing or malformed value is treated as zero so a single
//! bad field from the server cannot take down totals rendering.

use rust_decimal::{Decimal, RoundingStrategy};

/// Parse a decimal amount string leniently.
///
/// Returns [`Decimal::ZERO`] for `None`, empty, or unparsable input.
#[must_use]
pub fn parse_amount(raw: Option<&str>) -> Decimal {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<Decimal>().ok())
        .unwrap_or(Decimal::ZERO)
}

/// Format an amount with exactly two decimal places, e.g. `25` -> `"25.00"`.
///
/// Midpoints round away from zero (`12.345` -> `"12.35"`), matching how
/// currency amounts are displayed, not the default midpoint-to-even.
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_valid() {
        assert_eq!(parse_amount(Some("25.00")), Decimal::new(2500, 2));
        assert_eq!(parse_amount(Some("-1.5")), Decimal::new(-15, 1));
        assert_eq!(parse_amount(Some(" 3.10 ")), Decimal::new(310, 2));
    }

    #[test]
    fn test_parse_amount_lenient() {
        assert_eq!(parse_amount(None), Decimal::ZERO);
        assert_eq!(parse_amount(Some("")), Decimal::ZERO);
        assert_eq!(parse_amount(Some("not-a-number")), Decimal::ZERO);
        assert_eq!(parse_amount(Some("1.2.3")), Decimal::ZERO);
    }

    #[test]
    fn test_format_amount_two_decimals() {
        assert_eq!(format_amount(Decimal::new(25, 0)), "25.00");
        assert_eq!(format_amount(Decimal::new(255, 1)), "25.50");
        assert_eq!(format_amount(Decimal::new(12345, 3)), "12.35");
        assert_eq!(format_amount(Decimal::new(-12345, 3)), "-12.35");
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
    }
}
