//! Identifier types for SocialGrow.
//!
//! Row identifiers are opaque strings. Storage hands out UUIDs, but the
//! built-in fallback catalog uses readable ids such as `starter-plan`, and the
//! payment processor echoes whatever we put into checkout metadata, so the
//! types only require a non-empty value.
//!
//! # Macro-based ID Types
//!
//! The `string_id_type!` macro reduces boilerplate for identifier types,
//! ensuring consistent implementation of serialization, parsing, and display traits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Macro to define a string identifier type with standard trait implementations.
///
/// This macro generates a newtype wrapper around `String` with implementations for:
/// - `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `Serialize`, `Deserialize` (as string, validated)
/// - `FromStr`, `Display`, `Debug`
/// - `TryFrom<String>`, `Into<String>`, `AsRef<str>`
///
/// # Example
///
/// ```ignore
/// string_id_type!(MyId, "A custom identifier type.");
/// let id = MyId::generate();
/// let parsed: MyId = id.to_string().parse().unwrap();
/// ```
macro_rules! string_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Generate a new random identifier (UUID v4).
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Wrap a compile-time constant identifier.
            ///
            /// The value must be non-empty; it is not trimmed or validated.
            #[must_use]
            pub fn from_static(value: &'static str) -> Self {
                debug_assert!(!value.trim().is_empty());
                Self(value.to_string())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(IdError::Empty);
                }
                Ok(Self(trimmed.to_string()))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id_type!(
    UserId,
    "A user identifier.\n\nUser ids are issued by the identity provider and carried as the JWT `sub` claim."
);
string_id_type!(PlanId, "A subscription plan identifier.");
string_id_type!(SubscriptionId, "A subscription row identifier (not the payment processor's id).");
string_id_type!(OrderId, "An order row identifier.");
string_id_type!(AffiliateId, "An affiliate row identifier.");
string_id_type!(ReferralId, "A referral row identifier.");
string_id_type!(CouponId, "A coupon row identifier.");

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is empty or whitespace.
    #[error("identifier must not be empty")]
    Empty,
}
