//! Server-side effects for each checkout step.
//!
//! One operation per step, each safe to re-invoke when the user revisits a
//! step: creating the checkout is the only non-idempotent call and happens
//! once per session, address/method attachment is a PATCH of the same
//! relationship, and method lookups are reads.
//!
//! Addresses are attached through JSON:API relationship patches: the request
//! carries the relationship change on the `checkouts` resource plus an
//! `included` `checkoutaddresses` compound document (a denormalized snapshot
//! server-side; the session keeps only the returned reference id).

use serde_json::json;
use tracing::{instrument, warn};

use pomelo_core::{CheckoutId, OrderId, PaymentMethodId, ShippingMethodId, SourceListId};

use crate::api::convert::{self, CheckoutSummary};
use crate::api::document::{ApiDocument, Resource};
use crate::api::pipeline::{IdentityProvider, RequestPipeline};
use crate::api::transport::Transport;
use crate::error::{CheckoutError, Result};
use crate::session::{AddressSelection, PaymentFamily, PaymentMethod, ShippingMethod};

/// Local id used to tie the relationship to the included compound document.
const NEW_ADDRESS_LOCAL_ID: &str = "new-address";

/// Result of attaching an address to a checkout.
#[derive(Debug, Clone)]
pub struct AddressAttachment {
    /// Server-side checkout-address reference the session keeps.
    pub address_id: pomelo_core::AddressId,
    pub summary: CheckoutSummary,
}

/// A successfully placed order.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    /// Human-readable order number, when the backend supplies one.
    pub number: Option<String>,
}

/// Performs the server-side effect for each checkout step.
pub struct CheckoutStepExecutor<I, T> {
    pipeline: RequestPipeline<I, T>,
}

impl<I: IdentityProvider, T: Transport> CheckoutStepExecutor<I, T> {
    #[must_use]
    pub fn new(pipeline: RequestPipeline<I, T>) -> Self {
        Self { pipeline }
    }

    /// Create the checkout resource from a source line-item list.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response carries no
    /// checkout resource.
    #[instrument(skip(self), fields(source_list = %source_list_id))]
    pub async fn create_checkout(&self, source_list_id: &SourceListId) -> Result<CheckoutSummary> {
        let body = json!({
            "data": {
                "type": "checkouts",
                "relationships": {
                    "sourceList": {
                        "data": { "type": "shoppinglists", "id": source_list_id.as_str() }
                    }
                }
            }
        });
        let document = self.pipeline.post("checkouts", body).await?;
        primary_checkout(document)
    }

    /// Attach the billing address.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is missing the
    /// attached address.
    #[instrument(skip(self, selection), fields(checkout = %checkout_id))]
    pub async fn attach_billing_address(
        &self,
        checkout_id: &CheckoutId,
        selection: &AddressSelection,
    ) -> Result<AddressAttachment> {
        self.attach_address(checkout_id, "billingAddress", selection)
            .await
    }

    /// Attach a distinct shipping address.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::attach_billing_address`].
    #[instrument(skip(self, selection), fields(checkout = %checkout_id))]
    pub async fn attach_shipping_address(
        &self,
        checkout_id: &CheckoutId,
        selection: &AddressSelection,
    ) -> Result<AddressAttachment> {
        self.attach_address(checkout_id, "shippingAddress", selection)
            .await
    }

    /// Point the shipping-address relationship at the existing billing
    /// checkout address (ship-to-same-as-billing).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(checkout = %checkout_id))]
    pub async fn reuse_billing_for_shipping(
        &self,
        checkout_id: &CheckoutId,
        billing_address_id: &pomelo_core::AddressId,
    ) -> Result<AddressAttachment> {
        self.patch_address_reference(checkout_id, "shippingAddress", billing_address_id)
            .await
    }

    /// Re-point the billing relationship at an already attached checkout
    /// address. Attached ids live in the `checkoutaddresses` space, not
    /// `customeraddresses`, so a step re-run must not go through
    /// [`Self::attach_billing_address`] with the stored id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(checkout = %checkout_id))]
    pub async fn reattach_billing_address(
        &self,
        checkout_id: &CheckoutId,
        address_id: &pomelo_core::AddressId,
    ) -> Result<AddressAttachment> {
        self.patch_address_reference(checkout_id, "billingAddress", address_id)
            .await
    }

    /// Shipping counterpart of [`Self::reattach_billing_address`].
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(checkout = %checkout_id))]
    pub async fn reattach_shipping_address(
        &self,
        checkout_id: &CheckoutId,
        address_id: &pomelo_core::AddressId,
    ) -> Result<AddressAttachment> {
        self.patch_address_reference(checkout_id, "shippingAddress", address_id)
            .await
    }

    async fn patch_address_reference(
        &self,
        checkout_id: &CheckoutId,
        relationship: &str,
        address_id: &pomelo_core::AddressId,
    ) -> Result<AddressAttachment> {
        let mut relationships = serde_json::Map::new();
        relationships.insert(
            relationship.to_string(),
            json!({ "data": { "type": "checkoutaddresses", "id": address_id.as_str() } }),
        );
        let body = json!({
            "data": {
                "type": "checkouts",
                "id": checkout_id.as_str(),
                "relationships": relationships
            }
        });
        let document = self
            .pipeline
            .patch(&format!("checkouts/{checkout_id}"), body)
            .await?;
        Ok(AddressAttachment {
            address_id: address_id.clone(),
            summary: primary_checkout(document)?,
        })
    }

    async fn attach_address(
        &self,
        checkout_id: &CheckoutId,
        relationship: &str,
        selection: &AddressSelection,
    ) -> Result<AddressAttachment> {
        let included = match selection {
            AddressSelection::Existing(address_id) => json!([{
                "type": "checkoutaddresses",
                "id": NEW_ADDRESS_LOCAL_ID,
                "relationships": {
                    "customerAddress": {
                        "data": { "type": "customeraddresses", "id": address_id.as_str() }
                    }
                }
            }]),
            AddressSelection::New(input) => json!([{
                "type": "checkoutaddresses",
                "id": NEW_ADDRESS_LOCAL_ID,
                "attributes": input
            }]),
        };

        let mut relationships = serde_json::Map::new();
        relationships.insert(
            relationship.to_string(),
            json!({ "data": { "type": "checkoutaddresses", "id": NEW_ADDRESS_LOCAL_ID } }),
        );
        let body = json!({
            "data": {
                "type": "checkouts",
                "id": checkout_id.as_str(),
                "relationships": relationships
            },
            "included": included
        });

        let document = self
            .pipeline
            .patch(&format!("checkouts/{checkout_id}"), body)
            .await?;

        let address_id = document
            .included
            .iter()
            .find_map(|resource| match resource {
                Resource::CheckoutAddress(address) => Some(address.id.clone()),
                _ => None,
            })
            .ok_or_else(|| {
                CheckoutError::UnexpectedResponse(
                    "checkout address missing from attach response".to_string(),
                )
            })?;

        Ok(AddressAttachment {
            address_id,
            summary: primary_checkout(document)?,
        })
    }

    /// Fetch the shipping methods available for the current address.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(checkout = %checkout_id))]
    pub async fn shipping_methods(&self, checkout_id: &CheckoutId) -> Result<Vec<ShippingMethod>> {
        let document = self
            .pipeline
            .get(&format!("checkouts/{checkout_id}/shippingmethods"))
            .await?;
        Ok(collect_resources(document, |resource| match resource {
            Resource::ShippingMethod(method) => Some(convert::shipping_method(method)),
            _ => None,
        }))
    }

    /// Set the chosen shipping method on the checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(checkout = %checkout_id, method = %method_id))]
    pub async fn select_shipping_method(
        &self,
        checkout_id: &CheckoutId,
        method_id: &ShippingMethodId,
    ) -> Result<CheckoutSummary> {
        let body = json!({
            "data": {
                "type": "checkouts",
                "id": checkout_id.as_str(),
                "attributes": { "shippingMethod": method_id.as_str() }
            }
        });
        let document = self
            .pipeline
            .patch(&format!("checkouts/{checkout_id}"), body)
            .await?;
        primary_checkout(document)
    }

    /// Fetch the payment methods available for the checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(checkout = %checkout_id))]
    pub async fn payment_methods(&self, checkout_id: &CheckoutId) -> Result<Vec<PaymentMethod>> {
        let document = self
            .pipeline
            .get(&format!("checkouts/{checkout_id}/paymentmethods"))
            .await?;
        Ok(collect_resources(document, |resource| match resource {
            Resource::PaymentMethod(method) => Some(convert::payment_method(method)),
            _ => None,
        }))
    }

    /// Set the chosen payment method on the checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(checkout = %checkout_id, method = %method_id))]
    pub async fn select_payment_method(
        &self,
        checkout_id: &CheckoutId,
        method_id: &PaymentMethodId,
    ) -> Result<CheckoutSummary> {
        let body = json!({
            "data": {
                "type": "checkouts",
                "id": checkout_id.as_str(),
                "attributes": { "paymentMethod": method_id.as_str() }
            }
        });
        let document = self
            .pipeline
            .patch(&format!("checkouts/{checkout_id}"), body)
            .await?;
        primary_checkout(document)
    }

    /// Execute payment through the method family's sub-endpoint.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unclassifiable method id, and the
    /// usual request failures otherwise.
    #[instrument(skip(self), fields(checkout = %checkout_id, method = %method_id))]
    pub async fn execute_payment(
        &self,
        checkout_id: &CheckoutId,
        method_id: &PaymentMethodId,
    ) -> Result<PlacedOrder> {
        let family = PaymentFamily::from_method_id(method_id.as_str()).ok_or_else(|| {
            CheckoutError::Validation(format!("unrecognized payment method: {method_id}"))
        })?;

        let body = json!({
            "data": {
                "type": "payments",
                "attributes": { "paymentMethod": method_id.as_str() }
            }
        });
        let document = self
            .pipeline
            .post(
                &format!(
                    "checkouts/{checkout_id}/payments/{}",
                    family.endpoint_segment()
                ),
                body,
            )
            .await?;

        match document.into_primary() {
            Some(Resource::Order(order)) => Ok(PlacedOrder {
                order_id: order.id,
                number: order.attributes.identifier,
            }),
            _ => Err(CheckoutError::UnexpectedResponse(
                "order resource missing from payment response".to_string(),
            )),
        }
    }
}

fn primary_checkout(document: ApiDocument) -> Result<CheckoutSummary> {
    match document.into_primary() {
        Some(Resource::Checkout(checkout)) => Ok(convert::checkout_summary(checkout)),
        _ => Err(CheckoutError::UnexpectedResponse(
            "checkout resource missing from response".to_string(),
        )),
    }
}

fn collect_resources<R>(
    document: ApiDocument,
    mut pick: impl FnMut(Resource) -> Option<R>,
) -> Vec<R> {
    document
        .into_primary_many()
        .into_iter()
        .filter_map(|resource| {
            if matches!(resource, Resource::Unknown) {
                warn!("skipping unrecognized resource in collection response");
                return None;
            }
            pick(resource)
        })
        .collect()
}
