//! Newtype IDs for type-safe entity references.
//!
//! Every table in the website database is keyed by a `UUID` generated by
//! `PostgreSQL`. Use the `define_id!` macro to create wrappers that prevent
//! accidentally mixing a purchase ID with a checkout item ID.

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around [`uuid::Uuid`] with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `as_uuid()`
/// - `Display` and `FromStr` using the hyphenated UUID form
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use voxelfox_core::define_id;
/// define_id!(UserId);
/// define_id!(ItemId);
///
/// let user_id: UserId = "5f0c2d9c-2b0e-4c55-9d8a-0d7c7f4ab2a1".parse().unwrap();
/// assert_eq!(user_id.to_string(), "5f0c2d9c-2b0e-4c55-9d8a-0d7c7f4ab2a1");
///
/// // These are different types, so this won't compile:
/// // let _: ItemId = user_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn new(id: ::uuid::Uuid) -> Self {
                Self(id)
            }

            /// Get the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> ::uuid::Uuid {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                ::uuid::Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl From<::uuid::Uuid> for $name {
            fn from(id: ::uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for ::uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <::uuid::Uuid as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <::uuid::Uuid as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <::uuid::Uuid as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <::uuid::Uuid as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

// Entity IDs for the website tables
define_id!(LoginUserId);
define_id!(PaymentUserId);
define_id!(CheckoutItemId);
define_id!(PurchaseId);
define_id!(TransactionId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id: PurchaseId = "0b6f36a4-69a2-4f49-a90e-5cbe2f3d2d8e".parse().unwrap();
        assert_eq!(id.to_string(), "0b6f36a4-69a2-4f49-a90e-5cbe2f3d2d8e");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let id: CheckoutItemId = " 0b6f36a4-69a2-4f49-a90e-5cbe2f3d2d8e\n".parse().unwrap();
        assert_eq!(id.to_string(), "0b6f36a4-69a2-4f49-a90e-5cbe2f3d2d8e");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<LoginUserId>().is_err());
        assert!("".parse::<LoginUserId>().is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let id: LoginUserId = "0b6f36a4-69a2-4f49-a90e-5cbe2f3d2d8e".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0b6f36a4-69a2-4f49-a90e-5cbe2f3d2d8e\"");
    }
}
