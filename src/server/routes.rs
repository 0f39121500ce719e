use crate::errors::{FieldError, PricerError};
use crate::models::pde::{PdeRequest, PdeResponse};
use crate::orchestrator::{self, PriceRequest, PricingResponse};
use crate::pde_service;
use crate::state::{AppState, CountersSnapshot, PerfCounters};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;

fn malformed_body(rejection: JsonRejection) -> PricerError {
    PricerError::Validation(vec![FieldError::new("body", rejection.body_text())])
}

/// POST /api/price -- price one contract under the requested models
pub async fn post_price(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PriceRequest>, JsonRejection>,
) -> Result<Json<PricingResponse>, PricerError> {
    let Json(request) = payload.map_err(malformed_body)?;
    orchestrator::price(&state, request).await.map(Json)
}

/// POST /pde/price -- Crank-Nicolson solve; invalid requests get 422
pub async fn post_pde_price(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PdeRequest>, JsonRejection>,
) -> Response {
    let outcome = match payload {
        Ok(Json(request)) => pde_service::run(request).await,
        Err(rejection) => Err(malformed_body(rejection)),
    };

    match outcome {
        Ok(response) => {
            PerfCounters::bump(&state.counters.pde_solves, 1);
            Json::<PdeResponse>(response).into_response()
        }
        Err(e @ PricerError::Validation(_)) => {
            let mut resp = e.into_response();
            *resp.status_mut() = StatusCode::UNPROCESSABLE_ENTITY;
            resp
        }
        Err(e) => e.into_response(),
    }
}

/// GET /api/health -- liveness plus credential presence
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let uptime = chrono::Utc::now() - state.started_at;
    Json(serde_json::json!({
        "status": "ok",
        "marketDataConfigured": state.config.market_data_api_key.is_some(),
        "uptimeSecs": uptime.num_seconds(),
    }))
}

/// GET /api/counters -- request counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<CountersSnapshot> {
    Json(state.counters.snapshot())
}
