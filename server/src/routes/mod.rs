use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{health_check, orders, tickets, webhooks};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/orders", post(orders::create_order))
        .route("/orders/:reference", get(orders::get_order))
        .route("/orders/:reference/tickets", get(orders::order_tickets))
        .route("/orders/:reference/verify", post(orders::verify_payment))
        .route("/webhooks/paystack", post(webhooks::paystack_webhook))
        .route("/admin/orders/:reference/refund", post(orders::refund_order))
        .route("/admin/orders/:reference/fraud", post(orders::mark_fraud))
        .route("/tickets/:code/verify", get(tickets::verify_ticket))
        .route("/tickets/:code/check-in", post(tickets::check_in))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(&config.cors_allowed_origins))
}
