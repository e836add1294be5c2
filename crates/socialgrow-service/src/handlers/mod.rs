//! API handlers.

pub mod affiliates;
pub mod checkout;
pub mod coupons;
pub mod health;
pub mod orders;
pub mod plans;
pub mod referrals;
pub mod subscriptions;
pub mod webhooks;

use serde::Serialize;

/// Body of a negative validation answer (`{"valid": false, "error": ...}`).
#[derive(Debug, Serialize)]
pub struct Invalid {
    /// Always `false`.
    pub valid: bool,
    /// Why the input was rejected.
    pub error: String,
}

impl Invalid {
    /// A rejection carrying `error`.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: error.into(),
        }
    }
}
