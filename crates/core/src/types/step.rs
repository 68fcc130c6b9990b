//! The ordered checkout step sequence.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A step in the linear checkout flow.
///
/// Steps form a strict sequence; forward movement happens one step at a time
/// and only after the current step's server-side effect succeeds. The numeric
/// order of the variants is the canonical step order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    /// Attach a billing address to the checkout.
    #[default]
    Billing,
    /// Attach a shipping address (or reuse the billing address).
    Shipping,
    /// Choose one of the available shipping methods.
    ShippingMethod,
    /// Choose one of the available payment methods.
    Payment,
    /// Review the order and execute payment.
    Review,
}

impl CheckoutStep {
    /// All steps in flow order.
    pub const ALL: [Self; 5] = [
        Self::Billing,
        Self::Shipping,
        Self::ShippingMethod,
        Self::Payment,
        Self::Review,
    ];

    /// Zero-based position of this step in the flow.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The step after this one, or `None` from [`Self::Review`].
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Billing => Some(Self::Shipping),
            Self::Shipping => Some(Self::ShippingMethod),
            Self::ShippingMethod => Some(Self::Payment),
            Self::Payment => Some(Self::Review),
            Self::Review => None,
        }
    }

    /// The step before this one, or `None` from [`Self::Billing`].
    #[must_use]
    pub const fn prev(self) -> Option<Self> {
        match self {
            Self::Billing => None,
            Self::Shipping => Some(Self::Billing),
            Self::ShippingMethod => Some(Self::Shipping),
            Self::Payment => Some(Self::ShippingMethod),
            Self::Review => Some(Self::Payment),
        }
    }
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Billing => "billing",
            Self::Shipping => "shipping",
            Self::ShippingMethod => "shipping_method",
            Self::Payment => "payment",
            Self::Review => "review",
        };
        write!(f, "{name}")
    }
}
