//! API route handlers.
//!
//! All endpoints return JSON. The handlers borrow the orchestrator;
//! run triggers surface its single-flight guard as HTTP 409.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::engine::CycleOrchestrator;
use crate::types::{BetState, StakewiseError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ApiContext {
    orchestrator: Arc<CycleOrchestrator>,
}

impl ApiContext {
    pub fn new(orchestrator: Arc<CycleOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

pub type ApiState = Arc<ApiContext>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub bankroll: Decimal,
    pub peak_bankroll: Decimal,
    pub total_pnl: Decimal,
    pub win_rate: f64,
    pub bets_placed: u64,
    pub bets_won: u64,
    pub bets_lost: u64,
    pub bets_pushed: u64,
    pub open_bets: usize,
    pub proposed_bets: usize,
    pub budget_day: String,
    pub budget_committed: Decimal,
    pub budget_remaining: Decimal,
    pub last_daily_run: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    let engine = state.orchestrator.state_handle();
    let engine = engine.lock().await;

    let response = StatusResponse {
        bankroll: engine.account.bankroll,
        peak_bankroll: engine.account.peak_bankroll,
        total_pnl: engine.account.total_pnl,
        win_rate: engine.account.win_rate(),
        bets_placed: engine.account.bets_placed,
        bets_won: engine.account.bets_won,
        bets_lost: engine.account.bets_lost,
        bets_pushed: engine.account.bets_pushed,
        open_bets: engine.ledger.in_state(BetState::Placed).len(),
        proposed_bets: engine.ledger.in_state(BetState::Proposed).len(),
        budget_day: engine.budget.day.to_string(),
        budget_committed: engine.budget.committed,
        budget_remaining: engine.budget.remaining(),
        last_daily_run: engine.last_daily_run.map(|d| d.to_string()),
    };
    Json(response)
}

pub async fn trigger_daily_run(State(state): State<ApiState>) -> impl IntoResponse {
    match state.orchestrator.run_daily().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn trigger_resolution(State(state): State<ApiState>) -> impl IntoResponse {
    match state.orchestrator.run_resolution().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: StakewiseError) -> axum::response::Response {
    let status = match e {
        StakewiseError::RunInProgress(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: e.to_string() })).into_response()
}
