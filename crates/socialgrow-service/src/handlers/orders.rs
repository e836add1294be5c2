//! Order history handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use socialgrow_core::Order;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Order list response.
#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    /// The caller's orders, newest first.
    pub orders: Vec<Order>,
    /// Number of orders.
    pub count: usize,
}

/// List the caller's orders.
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<OrdersResponse>, ApiError> {
    let orders = state.store.list_orders_by_user(&auth.user_id).await?;
    Ok(Json(OrdersResponse {
        count: orders.len(),
        orders,
    }))
}
