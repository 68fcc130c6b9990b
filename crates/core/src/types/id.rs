//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. The backing type is
//! `String` because the commerce backend issues opaque string identifiers.

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>` and `From<&str>` implementations
///
/// # Example
///
/// ```rust
/// # use pomelo_core::define_id;
/// define_id!(CheckoutId);
/// define_id!(OrderId);
///
/// let checkout_id = CheckoutId::new("42");
/// let order_id = OrderId::new("42");
///
/// // These are different types, so this won't compile:
/// // let _: CheckoutId = order_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID, returning the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

// Define standard entity IDs
define_id!(SourceListId);
define_id!(CheckoutId);
define_id!(AddressId);
define_id!(ProductId);
define_id!(ShippingMethodId);
define_id!(PaymentMethodId);
define_id!(OrderId);
define_id!(CountryId);
define_id!(RegionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_accessors() {
        let id = CheckoutId::new("chk-123");
        assert_eq!(id.to_string(), "chk-123");
        assert_eq!(id.as_str(), "chk-123");
        assert_eq!(id.clone().into_inner(), "chk-123");
    }

    #[test]
    fn test_id_conversions() {
        let id: OrderId = "ord-9".into();
        assert_eq!(id, OrderId::new(String::from("ord-9")));
        let raw: String = id.into();
        assert_eq!(raw, "ord-9");
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = AddressId::new("addr-7");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"addr-7\"");
        let back: AddressId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
