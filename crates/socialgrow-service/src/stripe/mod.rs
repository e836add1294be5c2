//! Stripe integration for subscriptions and billing.
//!
//! Stripe handles:
//! - Customers and hosted Checkout sessions
//! - The customer billing portal
//! - Coupons mirrored from storage
//! - Signed webhook delivery of subscription lifecycle events

pub mod client;
pub mod types;
pub mod webhook;

pub use client::StripeClient;
pub use client::StripeError;
pub use types::*;
pub use webhook::verify_signature;
