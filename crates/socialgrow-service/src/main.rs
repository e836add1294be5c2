//! SocialGrow Service - HTTP API for plans, checkout and affiliates
//!
//! This is the main entry point for the socialgrow service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use socialgrow_core::fallback_plans;
use socialgrow_service::{create_router, AppState, ServiceConfig};
use socialgrow_store::{MemoryStore, Store, SupabaseStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,socialgrow=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting SocialGrow Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        app_url = %config.app_url,
        supabase_configured = %config.has_supabase(),
        stripe_configured = %config.stripe_secret_key.is_some(),
        webhooks_configured = %config.stripe_webhook_secret.is_some(),
        "Service configuration loaded"
    );

    let store: Arc<dyn Store> = match (&config.supabase_url, &config.supabase_service_role_key) {
        (Some(url), Some(key)) => {
            tracing::info!(supabase_url = %url, "Using Supabase store");
            Arc::new(SupabaseStore::new(url, key.clone())?)
        }
        _ => {
            tracing::warn!("Supabase not configured - using in-memory store with built-in plans");
            Arc::new(MemoryStore::with_plans(fallback_plans()))
        }
    };

    // Build app state
    let state = AppState::new(store, config.clone());

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
