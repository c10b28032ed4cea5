//! Admin API.
//!
//! # Routes
//! - `GET  /admin/status`        liveness plus circuit state
//! - `GET  /admin/health`        full health metrics of the payment service
//! - `GET  /admin/transactions`  audit log, `?transaction_id=` to filter
//! - `POST /admin/recover`       run a recovery sweep
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::payments::ResilientPaymentService;

/// Recovery sweeps replay provider calls; they get the longest budget.
const ADMIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct AdminState {
    pub service: Arc<ResilientPaymentService>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(service: Arc<ResilientPaymentService>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            service,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/health", get(get_health))
        .route("/admin/transactions", get(get_transactions))
        .route("/admin/recover", post(post_recover))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            ADMIN_REQUEST_TIMEOUT,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
