pub mod solver;

use crate::errors::{PricerError, PricerResult};
use crate::models::pde::{PdeRequest, PdeResponse};

/// Validates and solves one PDE request on the blocking pool.
pub async fn run(request: PdeRequest) -> PricerResult<PdeResponse> {
    let errors = solver::validate(&request);
    if !errors.is_empty() {
        return Err(PricerError::Validation(errors));
    }

    let symbol = request.symbol.clone();
    let response = tokio::task::spawn_blocking(move || solver::solve(&request))
        .await
        .map_err(|e| PricerError::Model(format!("PDE solver task: {e}")))?;

    tracing::info!(
        symbol = %symbol,
        fair_value = response.fair_value,
        residual = response.diagnostics.residual_norm,
        runtime_ms = ?response.diagnostics.runtime_ms,
        warnings = response.warnings.len(),
        "PDE solve complete"
    );
    Ok(response)
}
