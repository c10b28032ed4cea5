use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AdminState;
use crate::payments::{HealthMetrics, RecoverySummary, TransactionLogEntry};
use crate::resilience::CircuitState;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub circuit_state: CircuitState,
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub transaction_id: Option<String>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let breaker = state.service.circuit_breaker();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if breaker.is_healthy() { "operational" } else { "degraded" },
        circuit_state: breaker.state(),
    })
}

pub async fn get_health(State(state): State<AdminState>) -> Json<HealthMetrics> {
    Json(state.service.health_metrics())
}

pub async fn get_transactions(
    State(state): State<AdminState>,
    Query(query): Query<TransactionQuery>,
) -> Json<Vec<TransactionLogEntry>> {
    Json(state.service.get_transaction_logs(query.transaction_id.as_deref()))
}

pub async fn post_recover(State(state): State<AdminState>) -> Json<RecoverySummary> {
    Json(state.service.recover_failed_transactions().await)
}
