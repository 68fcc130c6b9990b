//! Pure totals computation over the session's line items.
//!
//! No I/O and no shared state: given the same inputs this always produces
//! the same output, so it is called freely on every render.

use pomelo_core::{format_amount, parse_amount};
use rust_decimal::Decimal;

use crate::session::{LineItem, ShippingMethod};

/// Computed checkout totals.
///
/// `discount` keeps the server's signed semantics (a negative delta); use
/// [`Totals::discount_display`] for the absolute value shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl Totals {
    #[must_use]
    pub fn has_discount(&self) -> bool {
        !self.discount.is_zero()
    }

    #[must_use]
    pub fn has_shipping(&self) -> bool {
        !self.shipping.is_zero()
    }

    #[must_use]
    pub fn subtotal_display(&self) -> String {
        format_amount(self.subtotal)
    }

    /// Absolute discount value for display.
    #[must_use]
    pub fn discount_display(&self) -> String {
        format_amount(self.discount.abs())
    }

    #[must_use]
    pub fn shipping_display(&self) -> String {
        format_amount(self.shipping)
    }

    #[must_use]
    pub fn total_display(&self) -> String {
        format_amount(self.total)
    }
}

/// Compute totals from line items and the selected shipping method.
///
/// - `subtotal` sums each item's pre-discount line total, falling back to
///   unit price x quantity when the server did not supply one.
/// - `discount` sums the per-item negative deltas.
/// - `shipping` is the cost of the first type entry of the selected method.
/// - `total` is the server-reported total when it parses, otherwise
///   `subtotal + discount + shipping` (discount is already negative).
///
/// Malformed numeric strings are treated as zero; this never fails.
#[must_use]
pub fn compute(
    items: &[LineItem],
    shipping_method: Option<&ShippingMethod>,
    server_total: Option<&str>,
) -> Totals {
    let subtotal: Decimal = items.iter().map(line_subtotal).sum();
    let discount: Decimal = items
        .iter()
        .map(|item| parse_amount(item.discount.as_deref()))
        .sum();
    let shipping = shipping_method
        .map(|method| parse_amount(method.primary_cost()))
        .unwrap_or(Decimal::ZERO);

    let total = server_total
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| raw.parse::<Decimal>().ok())
        .unwrap_or(subtotal + discount + shipping);

    Totals {
        subtotal,
        discount,
        shipping,
        total,
    }
}

fn line_subtotal(item: &LineItem) -> Decimal {
    match item.subtotal.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_amount(Some(raw)),
        _ => parse_amount(item.unit_price.as_deref()) * item.quantity,
    }
}
