//! Conversions from wire resources to domain types.

use crate::api::document::{
    AddressAttributes, CheckoutResource, PaymentMethodResource, ShippingMethodResource,
};
use crate::session::{Address, PaymentMethod, ShippingMethod, ShippingMethodType};
use pomelo_core::{AddressId, CheckoutId};

/// The server-recalculated state of a checkout resource after a mutation.
#[derive(Debug, Clone)]
pub struct CheckoutSummary {
    pub id: CheckoutId,
    pub total: Option<String>,
    pub subtotal: Option<String>,
    pub currency: Option<String>,
}

pub fn checkout_summary(resource: CheckoutResource) -> CheckoutSummary {
    CheckoutSummary {
        id: resource.id,
        total: resource.attributes.total_value,
        subtotal: resource.attributes.subtotal_value,
        currency: resource.attributes.currency,
    }
}

pub fn address(id: AddressId, attributes: AddressAttributes) -> Address {
    Address {
        id,
        label: attributes.label,
        first_name: attributes.first_name,
        last_name: attributes.last_name,
        street: attributes.street,
        street2: attributes.street2,
        city: attributes.city,
        postal_code: attributes.postal_code,
        country: attributes.country,
        region: attributes.region,
        phone: attributes.phone,
    }
}

pub fn shipping_method(resource: ShippingMethodResource) -> ShippingMethod {
    ShippingMethod {
        id: resource.id,
        label: resource.attributes.label,
        types: resource
            .attributes
            .types
            .into_iter()
            .map(|t| ShippingMethodType {
                identifier: t.identifier,
                label: t.label,
                cost: t.cost,
            })
            .collect(),
    }
}

pub fn payment_method(resource: PaymentMethodResource) -> PaymentMethod {
    PaymentMethod {
        id: resource.id,
        label: resource.attributes.label,
    }
}
