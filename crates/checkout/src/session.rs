//! Checkout session state and the domain types it carries.
//!
//! A [`CheckoutSession`] is derived from one source line-item list and lives
//! until the order is placed or the session is abandoned. Line items are
//! read-only here: quantity and unit changes happen upstream in the source
//! list and require deriving a new session.

use std::collections::BTreeSet;

use pomelo_core::{
    AddressId, CheckoutId, CheckoutStep, CountryId, PaymentMethodId, ProductId, RegionId,
    ShippingMethodId, SourceListId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::machine::StepState;

/// Current persisted snapshot format. Bump when the layout changes; a
/// mismatch on load is treated like corruption and starts a fresh session.
pub const SNAPSHOT_VERSION: u32 = 1;

// =============================================================================
// Upstream input
// =============================================================================

/// The read-only line-item collection a checkout is derived from.
#[derive(Debug, Clone)]
pub struct SourceList {
    pub id: SourceListId,
    pub name: String,
    pub items: Vec<LineItem>,
}

/// One purchasable line, immutable once loaded from the source list.
///
/// Amounts are decimal strings exactly as the server sent them; parsing is
/// deferred to the totals calculator, which treats malformed values as zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: Decimal,
    /// Unit code, e.g. `item` or `kg`.
    pub unit: String,
    pub unit_price: Option<String>,
    /// Pre-discount line total, when the server supplied one.
    pub subtotal: Option<String>,
    /// Discount as a negative delta from the server.
    pub discount: Option<String>,
    pub total: Option<String>,
}

// =============================================================================
// Addresses
// =============================================================================

/// A saved customer address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub label: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub street: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<CountryId>,
    pub region: Option<RegionId>,
    pub phone: Option<String>,
}

/// Input for creating a new address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<CountryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// How the user chose the address for a step: an existing saved address or
/// a freshly entered one.
#[derive(Debug, Clone)]
pub enum AddressSelection {
    Existing(AddressId),
    New(AddressInput),
}

// =============================================================================
// Shipping and payment methods
// =============================================================================

/// A shipping method candidate returned for the current shipping address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: ShippingMethodId,
    pub label: String,
    /// The method's type entries; the first one carries the displayed cost.
    pub types: Vec<ShippingMethodType>,
}

impl ShippingMethod {
    /// Cost string of the first type entry, if any.
    #[must_use]
    pub fn primary_cost(&self) -> Option<&str> {
        self.types.first().and_then(|t| t.cost.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingMethodType {
    pub identifier: String,
    pub label: Option<String>,
    pub cost: Option<String>,
}

/// A payment method candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub label: String,
}

/// Families of payment methods, each executed through its own sub-endpoint.
///
/// The family is recognized by substrings of the method identifier, which is
/// how the backend names its integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFamily {
    /// Invoice-style terms: `payment_term`, `money_order`, `cheque`.
    PaymentTerm,
    /// Hosted wallets: `paypal`, `apple_pay`, `google_pay`.
    Wallet,
    /// Everything else routes through the card gateway endpoint.
    CardGateway,
}

impl PaymentFamily {
    const TERM_MARKERS: [&'static str; 3] = ["payment_term", "money_order", "cheque"];
    const WALLET_MARKERS: [&'static str; 3] = ["paypal", "apple_pay", "google_pay"];

    /// Classify a payment method id. Returns `None` for an empty id.
    #[must_use]
    pub fn from_method_id(id: &str) -> Option<Self> {
        if id.trim().is_empty() {
            return None;
        }
        if Self::TERM_MARKERS.iter().any(|m| id.contains(m)) {
            Some(Self::PaymentTerm)
        } else if Self::WALLET_MARKERS.iter().any(|m| id.contains(m)) {
            Some(Self::Wallet)
        } else {
            Some(Self::CardGateway)
        }
    }

    /// URL segment of the family's payment-execution sub-endpoint.
    #[must_use]
    pub const fn endpoint_segment(self) -> &'static str {
        match self {
            Self::PaymentTerm => "payment-term",
            Self::Wallet => "wallet",
            Self::CardGateway => "card",
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// One resumable checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    /// Identifier of the originating line-item collection. Immutable.
    pub source_list_id: SourceListId,
    pub list_name: String,
    /// Read-only; always re-derived from the source list, never persisted.
    pub line_items: Vec<LineItem>,
    /// Server-assigned once the checkout resource is created. Set once.
    pub checkout_id: Option<CheckoutId>,
    /// Step sequencing state (current, completed, furthest reached).
    pub state: StepState,
    pub billing_address_id: Option<AddressId>,
    pub shipping_address_id: Option<AddressId>,
    pub ship_to_same_as_billing: bool,
    pub selected_shipping_method_id: Option<ShippingMethodId>,
    /// Advisory cache; re-fetched whenever a page reloads without one.
    pub cached_shipping_methods: Vec<ShippingMethod>,
    pub selected_payment_method_id: Option<PaymentMethodId>,
    /// Advisory cache; re-fetched whenever a page reloads without one.
    pub cached_payment_methods: Vec<PaymentMethod>,
    /// Last server-reported checkout total, if any.
    pub server_total: Option<String>,
}

impl CheckoutSession {
    /// Start a fresh session at the billing step.
    #[must_use]
    pub fn fresh(source_list: &SourceList) -> Self {
        Self {
            source_list_id: source_list.id.clone(),
            list_name: source_list.name.clone(),
            line_items: source_list.items.clone(),
            checkout_id: None,
            state: StepState::default(),
            billing_address_id: None,
            shipping_address_id: None,
            ship_to_same_as_billing: false,
            selected_shipping_method_id: None,
            cached_shipping_methods: vec![],
            selected_payment_method_id: None,
            cached_payment_methods: vec![],
            server_total: None,
        }
    }

    /// Restore a session from a persisted snapshot. Line items always come
    /// from the live source list, not the snapshot.
    #[must_use]
    pub fn resume(source_list: &SourceList, snapshot: SessionSnapshot) -> Self {
        Self {
            source_list_id: source_list.id.clone(),
            list_name: source_list.name.clone(),
            line_items: source_list.items.clone(),
            checkout_id: snapshot.checkout_id,
            state: StepState {
                current: snapshot.current_step,
                completed: snapshot.completed_steps,
                furthest: snapshot.furthest_step_reached,
            },
            billing_address_id: snapshot.billing_address_id,
            shipping_address_id: snapshot.shipping_address_id,
            ship_to_same_as_billing: snapshot.ship_to_same_as_billing,
            selected_shipping_method_id: snapshot.selected_shipping_method_id,
            cached_shipping_methods: snapshot.cached_shipping_methods,
            selected_payment_method_id: snapshot.selected_payment_method_id,
            cached_payment_methods: snapshot.cached_payment_methods,
            server_total: None,
        }
    }

    /// Capture the persistable fields. The save timestamp is stamped by the
    /// snapshot store at write time.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            source_list_id: self.source_list_id.clone(),
            checkout_id: self.checkout_id.clone(),
            current_step: self.state.current,
            completed_steps: self.state.completed.clone(),
            furthest_step_reached: self.state.furthest,
            billing_address_id: self.billing_address_id.clone(),
            shipping_address_id: self.shipping_address_id.clone(),
            ship_to_same_as_billing: self.ship_to_same_as_billing,
            selected_shipping_method_id: self.selected_shipping_method_id.clone(),
            cached_shipping_methods: self.cached_shipping_methods.clone(),
            selected_payment_method_id: self.selected_payment_method_id.clone(),
            cached_payment_methods: self.cached_payment_methods.clone(),
            saved_at_epoch_millis: 0,
        }
    }
}

/// The persisted layout: one snapshot per source-list id, selection fields
/// only (line items are always re-derived), plus a save timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub version: u32,
    pub source_list_id: SourceListId,
    pub checkout_id: Option<CheckoutId>,
    pub current_step: CheckoutStep,
    pub completed_steps: BTreeSet<CheckoutStep>,
    pub furthest_step_reached: CheckoutStep,
    pub billing_address_id: Option<AddressId>,
    pub shipping_address_id: Option<AddressId>,
    pub ship_to_same_as_billing: bool,
    pub selected_shipping_method_id: Option<ShippingMethodId>,
    pub cached_shipping_methods: Vec<ShippingMethod>,
    pub selected_payment_method_id: Option<PaymentMethodId>,
    pub cached_payment_methods: Vec<PaymentMethod>,
    pub saved_at_epoch_millis: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_list() -> SourceList {
        SourceList {
            id: SourceListId::new("list-1"),
            name: "Weekly order".to_string(),
            items: vec![LineItem {
                product_id: ProductId::new("sku-1"),
                name: "Apples".to_string(),
                quantity: Decimal::new(2, 0),
                unit: "item".to_string(),
                unit_price: Some("10.00".to_string()),
                subtotal: None,
                discount: None,
                total: None,
            }],
        }
    }

    #[test]
    fn test_snapshot_round_trip_restores_selections() {
        let list = source_list();
        let mut session = CheckoutSession::fresh(&list);
        session.checkout_id = Some(CheckoutId::new("chk-1"));
        session.billing_address_id = Some(AddressId::new("addr-1"));
        session.ship_to_same_as_billing = true;
        session.state.current = CheckoutStep::ShippingMethod;
        session.state.furthest = CheckoutStep::ShippingMethod;
        session
            .state
            .completed
            .extend([CheckoutStep::Billing, CheckoutStep::Shipping]);

        let snapshot = session.snapshot();
        let restored = CheckoutSession::resume(&list, snapshot);

        assert_eq!(restored.checkout_id, Some(CheckoutId::new("chk-1")));
        assert_eq!(restored.billing_address_id, Some(AddressId::new("addr-1")));
        assert!(restored.ship_to_same_as_billing);
        assert_eq!(restored.state.current, CheckoutStep::ShippingMethod);
        assert_eq!(restored.state.furthest, CheckoutStep::ShippingMethod);
        assert_eq!(restored.state.completed.len(), 2);
        // Line items come from the live list, not the snapshot.
        assert_eq!(restored.line_items.len(), 1);
    }

    #[test]
    fn test_payment_family_classification() {
        assert_eq!(
            PaymentFamily::from_method_id("payment_term_3"),
            Some(PaymentFamily::PaymentTerm)
        );
        assert_eq!(
            PaymentFamily::from_method_id("money_order_1"),
            Some(PaymentFamily::PaymentTerm)
        );
        assert_eq!(
            PaymentFamily::from_method_id("paypal_express_2"),
            Some(PaymentFamily::Wallet)
        );
        assert_eq!(
            PaymentFamily::from_method_id("stripe_gateway_4"),
            Some(PaymentFamily::CardGateway)
        );
        assert_eq!(PaymentFamily::from_method_id("  "), None);
    }

    #[test]
    fn test_shipping_method_primary_cost() {
        let method = ShippingMethod {
            id: ShippingMethodId::new("flat_rate_1"),
            label: "Flat Rate".to_string(),
            types: vec![
                ShippingMethodType {
                    identifier: "primary".to_string(),
                    label: None,
                    cost: Some("5.00".to_string()),
                },
                ShippingMethodType {
                    identifier: "express".to_string(),
                    label: None,
                    cost: Some("12.00".to_string()),
                },
            ],
        };
        assert_eq!(method.primary_cost(), Some("5.00"));
    }
}
