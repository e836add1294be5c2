//! Error types for SocialGrow domain rules.

use crate::coupon::CouponRejection;
use crate::ids::IdError;

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while applying domain rules.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// A string did not name a known enum variant.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// The enum being parsed (e.g. "platform").
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A coupon cannot be redeemed.
    #[error("coupon rejected: {0}")]
    CouponRejected(#[from] CouponRejection),

    /// Date arithmetic left the representable range.
    #[error("billing period out of range")]
    PeriodOutOfRange,
}
