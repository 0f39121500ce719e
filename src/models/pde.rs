use super::{Greeks, ModelDiagnostics, ModelKind, OptionType, PricingContext, PricingResult};
use crate::errors::{PricerError, PricerResult};
use reqwest::Client;

/// Wire request to the Crank-Nicolson service (snake_case JSON).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PdeRequest {
    pub symbol: String,
    pub option_type: OptionType,
    pub spot: f64,
    pub strike: f64,
    /// Years to expiration.
    pub expiry: f64,
    pub volatility: f64,
    pub risk_free_rate: f64,
    #[serde(default)]
    pub dividend_yield: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub grid_size: Option<usize>,
    #[serde(default)]
    pub time_steps: Option<usize>,
    #[serde(default)]
    pub s_max_multiplier: Option<f64>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PdeGreeks {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub rho: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PdeDiagnostics {
    pub grid_points: usize,
    pub time_steps: usize,
    pub residual_norm: f64,
    #[serde(default)]
    pub runtime_ms: Option<f64>,
    pub boundary_spread: f64,
    pub s_max: f64,
}

/// Wire response from the Crank-Nicolson service (snake_case JSON).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PdeResponse {
    pub symbol: String,
    pub option_type: OptionType,
    pub fair_value: f64,
    pub price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub greeks: PdeGreeks,
    pub diagnostics: PdeDiagnostics,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Client for the finite-difference pricing service. One attempt per call,
/// no retry; failures become a zero-valued result carrying a warning.
#[derive(Clone)]
pub struct PdeClient {
    client: Client,
    base_url: String,
}

impl PdeClient {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .pool_max_idle_per_host(4)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn price(&self, symbol: &str, ctx: &PricingContext) -> PricingResult {
        let request = PdeRequest {
            symbol: symbol.to_string(),
            option_type: ctx.option_type(),
            spot: ctx.spot(),
            strike: ctx.strike(),
            expiry: ctx.time_years(),
            volatility: ctx.volatility(),
            risk_free_rate: ctx.rate(),
            dividend_yield: ctx.dividend_yield(),
            quantity: ctx.quantity(),
            grid_size: None,
            time_steps: None,
            s_max_multiplier: None,
        };

        match self.post(&request).await {
            Ok(response) => into_result(ctx, response),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    symbol = %symbol,
                    "PDE pricing failed, substituting zero result"
                );
                let reason = format!("PDE pricing unavailable: {e}");
                PricingResult::degraded(ModelKind::Pde, ctx, reason)
            }
        }
    }

    async fn post(&self, request: &PdeRequest) -> PricerResult<PdeResponse> {
        let url = format!("{}/pde/price", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| PricerError::Network(format!("PDE service unreachable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PricerError::PdeService {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<PdeResponse>()
            .await
            .map_err(|e| PricerError::Parse(format!("PDE response: {e}")))
    }
}

/// Maps the service's snake_case payload onto the uniform result shape.
/// Price is recomputed from the unit value so the quantity invariant holds
/// whatever the service echoed back.
fn into_result(ctx: &PricingContext, response: PdeResponse) -> PricingResult {
    if !response.fair_value.is_finite() {
        return PricingResult::degraded(
            ModelKind::Pde,
            ctx,
            format!("PDE service returned non-finite fair value {}", response.fair_value),
        );
    }

    let mut result = PricingResult::priced(ModelKind::Pde, ctx, response.fair_value)
        .with_diagnostics(ModelDiagnostics::Pde(response.diagnostics));

    let g = &response.greeks;
    if let (Some(delta), Some(gamma), Some(theta), Some(vega), Some(rho)) =
        (g.delta, g.gamma, g.theta, g.vega, g.rho)
    {
        // Service reports theta per year and vega/rho per unit; rescale to
        // the per-day / per-point convention of the other models.
        result = result.with_greeks(Greeks {
            delta,
            gamma,
            theta: theta / 365.0,
            vega: vega / 100.0,
            rho: rho / 100.0,
        });
    }

    result.warnings.extend(response.warnings);
    result
}
