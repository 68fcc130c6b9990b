//! Typed JSON:API document model.
//!
//! The backend speaks JSON:API: compound documents with a `data` primary
//! section, an `included` array, and an `errors` array. Every known resource
//! type is decoded into a tagged-union [`Resource`] variant at this boundary
//! so the workflow logic never inspects untyped JSON. Unknown resource types
//! decode to [`Resource::Unknown`] and are skipped with a warning by callers.

use pomelo_core::{
    AddressId, CheckoutId, CountryId, OrderId, PaymentMethodId, RegionId, ShippingMethodId,
};
use serde::Deserialize;

/// A parsed JSON:API document.
#[derive(Debug, Default, Deserialize)]
pub struct ApiDocument {
    #[serde(default)]
    pub data: PrimaryData,
    #[serde(default)]
    pub included: Vec<Resource>,
    #[serde(default)]
    pub errors: Vec<ApiErrorObject>,
}

impl ApiDocument {
    /// Parse a response body. An empty body yields an empty document.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is non-empty and not valid JSON:API.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body)
    }

    /// The single primary resource, if the document has one.
    #[must_use]
    pub fn primary(&self) -> Option<&Resource> {
        match &self.data {
            PrimaryData::One(resource) => Some(resource),
            PrimaryData::None | PrimaryData::Many(_) => None,
        }
    }

    /// The primary resource collection (empty for single/absent data).
    #[must_use]
    pub fn primary_many(&self) -> &[Resource] {
        match &self.data {
            PrimaryData::Many(resources) => resources,
            PrimaryData::None | PrimaryData::One(_) => &[],
        }
    }

    /// Consume the document, yielding the single primary resource.
    #[must_use]
    pub fn into_primary(self) -> Option<Resource> {
        match self.data {
            PrimaryData::One(resource) => Some(resource),
            PrimaryData::None | PrimaryData::Many(_) => None,
        }
    }

    /// Consume the document, yielding the primary resource collection.
    #[must_use]
    pub fn into_primary_many(self) -> Vec<Resource> {
        match self.data {
            PrimaryData::Many(resources) => resources,
            PrimaryData::None | PrimaryData::One(_) => vec![],
        }
    }

    /// Server-provided error text, `detail` preferred over `title`,
    /// joined across error objects.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let messages: Vec<_> = self
            .errors
            .iter()
            .filter_map(ApiErrorObject::message)
            .collect();
        if messages.is_empty() {
            None
        } else {
            Some(messages.join("; "))
        }
    }
}

/// The `data` member of a document: absent, one resource, or many.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    #[default]
    None,
    One(Resource),
    Many(Vec<Resource>),
}

/// A JSON:API error object.
#[derive(Debug, Deserialize)]
pub struct ApiErrorObject {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiErrorObject {
    /// `detail` if present, otherwise `title`.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.detail.clone().or_else(|| self.title.clone())
    }
}

// =============================================================================
// Resources
// =============================================================================

/// A resource object, discriminated by its JSON:API `type` name.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum Resource {
    #[serde(rename = "checkouts")]
    Checkout(CheckoutResource),
    #[serde(rename = "checkoutaddresses")]
    CheckoutAddress(CheckoutAddressResource),
    #[serde(rename = "customeraddresses")]
    CustomerAddress(CustomerAddressResource),
    #[serde(rename = "shippingmethods")]
    ShippingMethod(ShippingMethodResource),
    #[serde(rename = "paymentmethods")]
    PaymentMethod(PaymentMethodResource),
    #[serde(rename = "countries")]
    Country(CountryResource),
    #[serde(rename = "regions")]
    Region(RegionResource),
    #[serde(rename = "orders")]
    Order(OrderResource),
    /// A type this client does not model; tolerated and skipped.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutResource {
    pub id: CheckoutId,
    #[serde(default)]
    pub attributes: CheckoutAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutAttributes {
    /// Server-computed order total, as a decimal string.
    #[serde(default)]
    pub total_value: Option<String>,
    /// Server-computed items subtotal, as a decimal string.
    #[serde(default)]
    pub subtotal_value: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Identifier of the shipping method currently set on the checkout.
    #[serde(default)]
    pub shipping_method: Option<String>,
    /// Identifier of the payment method currently set on the checkout.
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutAddressResource {
    pub id: AddressId,
    #[serde(default)]
    pub attributes: AddressAttributes,
}

#[derive(Debug, Deserialize)]
pub struct CustomerAddressResource {
    pub id: AddressId,
    #[serde(default)]
    pub attributes: AddressAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressAttributes {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub street2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<CountryId>,
    #[serde(default)]
    pub region: Option<RegionId>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShippingMethodResource {
    pub id: ShippingMethodId,
    pub attributes: ShippingMethodAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMethodAttributes {
    pub label: String,
    /// Cost-bearing type entries; the first one carries the displayed cost.
    #[serde(default)]
    pub types: Vec<ShippingMethodTypeAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMethodTypeAttributes {
    pub identifier: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Cost as a decimal string; missing/malformed values display as zero.
    #[serde(default)]
    pub cost: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentMethodResource {
    pub id: PaymentMethodId,
    pub attributes: PaymentMethodAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodAttributes {
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct CountryResource {
    pub id: CountryId,
    pub attributes: CountryAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryAttributes {
    pub name: String,
    #[serde(default)]
    pub iso2_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegionResource {
    pub id: RegionId,
    pub attributes: RegionAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionAttributes {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderResource {
    pub id: OrderId,
    #[serde(default)]
    pub attributes: OrderAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAttributes {
    /// Human-readable order number, when the backend supplies one.
    #[serde(default)]
    pub identifier: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_body() {
        let doc = ApiDocument::parse("").expect("empty body parses");
        assert!(doc.primary().is_none());
        assert!(doc.primary_many().is_empty());
        assert!(doc.errors.is_empty());
    }

    #[test]
    fn test_parse_single_checkout() {
        let body = r#"{
            "data": {
                "type": "checkouts",
                "id": "chk-1",
                "attributes": { "totalValue": "25.00", "currency": "USD" }
            }
        }"#;
        let doc = ApiDocument::parse(body).expect("parses");
        match doc.primary() {
            Some(Resource::Checkout(checkout)) => {
                assert_eq!(checkout.id.as_str(), "chk-1");
                assert_eq!(checkout.attributes.total_value.as_deref(), Some("25.00"));
            }
            other => panic!("expected checkout resource, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_collection_with_unknown_included() {
        let body = r#"{
            "data": [
                {
                    "type": "shippingmethods",
                    "id": "flat_rate_1",
                    "attributes": {
                        "label": "Flat Rate",
                        "types": [{ "identifier": "primary", "cost": "5.00" }]
                    }
                }
            ],
            "included": [
                { "type": "productimages", "id": "img-1", "attributes": {} }
            ]
        }"#;
        let doc = ApiDocument::parse(body).expect("parses");
        assert_eq!(doc.primary_many().len(), 1);
        assert!(matches!(doc.included.first(), Some(Resource::Unknown)));
    }

    #[test]
    fn test_error_message_prefers_detail() {
        let body = r#"{
            "errors": [
                { "status": "400", "title": "Bad Request", "detail": "Postal code is required" },
                { "status": "400", "title": "Bad Request" }
            ]
        }"#;
        let doc = ApiDocument::parse(body).expect("parses");
        assert_eq!(
            doc.error_message().as_deref(),
            Some("Postal code is required; Bad Request")
        );
    }

    #[test]
    fn test_null_data_is_none() {
        let doc = ApiDocument::parse(r#"{ "data": null }"#).expect("parses");
        assert!(doc.primary().is_none());
    }
}
