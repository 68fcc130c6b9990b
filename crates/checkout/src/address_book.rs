//! Saved customer addresses and the country/region reference data the
//! address form needs.

use serde_json::json;
use tracing::instrument;

use pomelo_core::{AddressId, CountryId, RegionId};

use crate::api::convert;
use crate::api::document::Resource;
use crate::api::pipeline::{IdentityProvider, RequestPipeline};
use crate::api::transport::Transport;
use crate::error::{CheckoutError, Result};
use crate::session::{Address, AddressInput};

/// A country the store ships to.
#[derive(Debug, Clone)]
pub struct Country {
    pub id: CountryId,
    pub name: String,
    pub iso2_code: Option<String>,
}

/// An administrative region within a country.
#[derive(Debug, Clone)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub code: Option<String>,
}

/// Read/write access to the customer's saved addresses.
pub struct AddressBook<I, T> {
    pipeline: RequestPipeline<I, T>,
}

impl<I: IdentityProvider, T: Transport> AddressBook<I, T> {
    #[must_use]
    pub fn new(pipeline: RequestPipeline<I, T>) -> Self {
        Self { pipeline }
    }

    /// The customer's saved addresses, for the existing-address picker.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn customer_addresses(&self) -> Result<Vec<Address>> {
        let document = self.pipeline.get("customeraddresses").await?;
        Ok(document
            .into_primary_many()
            .into_iter()
            .filter_map(|resource| match resource {
                Resource::CustomerAddress(address) => {
                    Some(convert::address(address.id, address.attributes))
                }
                _ => None,
            })
            .collect())
    }

    /// Save a new address to the customer's address book, independent of any
    /// checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response carries no
    /// address resource.
    #[instrument(skip(self, input))]
    pub async fn create_customer_address(&self, input: &AddressInput) -> Result<Address> {
        let body = json!({
            "data": {
                "type": "customeraddresses",
                "attributes": input
            }
        });
        let document = self.pipeline.post("customeraddresses", body).await?;
        match document.into_primary() {
            Some(Resource::CustomerAddress(address)) => {
                Ok(convert::address(address.id, address.attributes))
            }
            _ => Err(CheckoutError::UnexpectedResponse(
                "address resource missing from create response".to_string(),
            )),
        }
    }

    /// Remove a saved address.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(address = %address_id))]
    pub async fn delete_customer_address(&self, address_id: &AddressId) -> Result<()> {
        self.pipeline
            .delete(&format!("customeraddresses/{address_id}"))
            .await?;
        Ok(())
    }

    /// Countries available for address entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn countries(&self) -> Result<Vec<Country>> {
        let document = self.pipeline.get("countries").await?;
        Ok(document
            .into_primary_many()
            .into_iter()
            .filter_map(|resource| match resource {
                Resource::Country(country) => Some(Country {
                    id: country.id,
                    name: country.attributes.name,
                    iso2_code: country.attributes.iso2_code,
                }),
                _ => None,
            })
            .collect())
    }

    /// Regions for one country.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(country = %country_id))]
    pub async fn regions(&self, country_id: &CountryId) -> Result<Vec<Region>> {
        let document = self
            .pipeline
            .get(&format!("countries/{country_id}/regions"))
            .await?;
        Ok(document
            .into_primary_many()
            .into_iter()
            .filter_map(|resource| match resource {
                Resource::Region(region) => Some(Region {
                    id: region.id,
                    name: region.attributes.name,
                    code: region.attributes.code,
                }),
                _ => None,
            })
            .collect())
    }
}
