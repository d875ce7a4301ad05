//! HTTP front door.

pub mod auth;
mod error;
pub mod handlers;

use crate::application::orders::OrderService;
use crate::application::withdrawals::BalanceService;
use auth::JwtVerifier;
use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub balances: BalanceService,
    pub jwt: JwtVerifier,
}

pub fn router(state: AppState) -> Router {
    let user_routes = Router::new()
        .route(
            "/api/user/orders",
            post(handlers::submit_order).get(handlers::list_orders),
        )
        .route("/api/user/balance", get(handlers::balance))
        .route("/api/user/balance/withdraw", post(handlers::withdraw))
        .route("/api/user/withdrawals", get(handlers::list_withdrawals))
        .route_layer(from_fn_with_state(state.clone(), auth::require_user));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(user_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
