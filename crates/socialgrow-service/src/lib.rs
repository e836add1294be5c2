//! SocialGrow HTTP API service.
//!
//! This crate provides the HTTP API behind the SocialGrow web app:
//!
//! - Plan catalog with a built-in fallback
//! - Stripe Checkout and the billing portal
//! - Stripe webhook consumption (subscriptions, orders, commissions)
//! - Affiliate enrollment, referral tracking and coupons
//!
//! # Authentication
//!
//! Signed-in routes take a Supabase session token as a bearer token. It is
//! verified locally when the project JWT secret is configured and against
//! Supabase Auth otherwise. Webhooks are authenticated by their signature.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)]

pub mod auth;
pub mod checkout;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod routes;
pub mod state;
pub mod stripe;
pub mod webhook;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};
