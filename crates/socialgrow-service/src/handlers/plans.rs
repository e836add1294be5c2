//! Plan catalog handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use socialgrow_core::Plan;
use socialgrow_store::CatalogSource;

use crate::state::AppState;

/// Shown when the listing comes from the built-in table.
pub const DEGRADED_NOTE: &str = "Using mock data - database unavailable";

/// Plan listing response.
#[derive(Debug, Serialize)]
pub struct PlansResponse {
    /// Active plans, cheapest first.
    pub plans: Vec<Plan>,
    /// Number of plans.
    pub count: usize,
    /// Where the plans came from.
    pub source: CatalogSource,
    /// Present when storage was bypassed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

/// List active plans. Never fails: storage problems degrade to the built-in
/// plans.
pub async fn list_plans(State(state): State<Arc<AppState>>) -> Json<PlansResponse> {
    let listing = state.catalog.list_active_plans().await;
    let note = listing.is_degraded().then_some(DEGRADED_NOTE);

    Json(PlansResponse {
        count: listing.plans.len(),
        plans: listing.plans,
        source: listing.source,
        note,
    })
}
