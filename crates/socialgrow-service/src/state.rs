//! Application state.

use std::sync::Arc;

use socialgrow_store::{FallbackCatalog, Store};

use crate::auth::{IdentityVerifier, JwtVerifier, RemoteVerifier};
use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::stripe::StripeClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Plan catalog over `store`, degrading to the built-in plans.
    pub catalog: Arc<FallbackCatalog>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Stripe client for payments (optional).
    pub stripe: Option<Arc<StripeClient>>,

    /// Session verifier for bearer tokens (optional).
    pub identity: Option<Arc<dyn IdentityVerifier>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let catalog = Arc::new(FallbackCatalog::new(store.clone()));

        // Create Stripe client if configured
        let stripe = config.stripe_secret_key.as_ref().and_then(|key| {
            match StripeClient::with_base_url(key, &config.stripe_api_base) {
                Ok(client) => {
                    tracing::info!("Stripe integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - checkout will not be available");
        }
        if config.stripe_webhook_secret.is_none() {
            tracing::warn!("Stripe webhook secret not configured - webhooks will be rejected");
        }

        let identity = build_identity_verifier(&config);
        if identity.is_none() {
            tracing::warn!(
                "Supabase auth not configured - authenticated routes will reject all requests"
            );
        }

        Self {
            store,
            catalog,
            config,
            stripe,
            identity,
        }
    }

    /// Check if Stripe is configured.
    #[must_use]
    pub fn has_stripe(&self) -> bool {
        self.stripe.is_some()
    }

    /// The Stripe client, or an error for routes that cannot work without it.
    pub fn stripe_client(&self) -> Result<&StripeClient, ApiError> {
        self.stripe
            .as_deref()
            .ok_or_else(|| ApiError::ExternalService("Stripe not configured".into()))
    }
}

fn build_identity_verifier(config: &ServiceConfig) -> Option<Arc<dyn IdentityVerifier>> {
    if let Some(secret) = &config.supabase_jwt_secret {
        tracing::info!("Verifying sessions locally with the project JWT secret");
        return Some(Arc::new(JwtVerifier::new(secret)));
    }

    let (url, anon_key) = config
        .supabase_url
        .as_ref()
        .zip(config.supabase_anon_key.as_ref())?;

    match RemoteVerifier::new(url, anon_key.clone()) {
        Ok(verifier) => {
            tracing::info!(supabase_url = %url, "Verifying sessions against Supabase Auth");
            Some(Arc::new(verifier))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create Supabase Auth client");
            None
        }
    }
}
