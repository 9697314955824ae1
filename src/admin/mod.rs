//! Operator API over the ledger and refund manager.
//!
//! Every route requires the admin bearer token. Donations themselves are
//! not started here; wallets and card confirmation live client-side.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::payments::DonationService;

#[derive(Clone)]
pub struct AdminState {
    pub service: Arc<DonationService>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(service: Arc<DonationService>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            service,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/ledger", get(list_ledger))
        .route("/admin/ledger/{reference}", get(get_ledger_entry))
        .route("/admin/ledger/{reference}/refund-eligibility", get(get_refund_eligibility))
        .route("/admin/ledger/{reference}/refund", post(post_refund))
        .route("/admin/refund-requests", get(list_refund_requests))
        .route("/admin/explorer", get(get_explorer_link))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}
