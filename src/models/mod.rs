pub mod analytic;
pub mod lattice;
pub mod normal;
pub mod pde;
pub mod rng;
pub mod simulation;

use crate::errors::{PricerError, PricerResult};
use pde::{PdeClient, PdeDiagnostics};
use simulation::SimulationDiagnostics;

/// Volatility floor; keeps d1/d2 and the tree's up factor finite.
pub const MIN_VOLATILITY: f64 = 0.0001;
pub const MAX_VOLATILITY: f64 = 5.0;
/// One calendar day in years. Time-to-expiration never drops below this.
pub const MIN_TIME_YEARS: f64 = 1.0 / 365.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

impl OptionType {
    #[inline]
    pub fn intrinsic(self, spot: f64, strike: f64) -> f64 {
        match self {
            Self::Call => (spot - strike).max(0.0),
            Self::Put => (strike - spot).max(0.0),
        }
    }

    #[inline]
    pub fn breakeven(self, strike: f64, fair_value: f64) -> f64 {
        match self {
            Self::Call => strike + fair_value,
            Self::Put => strike - fair_value,
        }
    }
}

/// The four independently invocable pricing methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Analytic,
    Lattice,
    Simulation,
    Pde,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analytic => write!(f, "analytic"),
            Self::Lattice => write!(f, "lattice"),
            Self::Simulation => write!(f, "simulation"),
            Self::Pde => write!(f, "pde"),
        }
    }
}

/// Raw pricing inputs before clamping.
#[derive(Debug, Clone, Copy)]
pub struct ContextInputs {
    pub option_type: OptionType,
    pub spot: f64,
    pub strike: f64,
    pub time_years: f64,
    pub rate: f64,
    pub volatility: f64,
    pub dividend_yield: f64,
    pub quantity: u32,
}

/// Immutable pricing parameters shared by every model of one request.
/// Built once through `PricingContext::new`, which enforces the clamps,
/// so every model sees identical, in-range inputs.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingContext {
    option_type: OptionType,
    spot: f64,
    strike: f64,
    time_years: f64,
    rate: f64,
    volatility: f64,
    dividend_yield: f64,
    quantity: u32,
}

impl PricingContext {
    pub fn new(inputs: ContextInputs) -> PricerResult<Self> {
        if !(inputs.spot.is_finite() && inputs.spot > 0.0) {
            return Err(PricerError::Model(format!("spot must be positive, got {}", inputs.spot)));
        }
        if !(inputs.strike.is_finite() && inputs.strike > 0.0) {
            return Err(PricerError::Model(format!(
                "strike must be positive, got {}",
                inputs.strike
            )));
        }
        if inputs.quantity == 0 {
            return Err(PricerError::Model("quantity must be positive".into()));
        }

        let time_years = if inputs.time_years.is_finite() {
            inputs.time_years.max(MIN_TIME_YEARS)
        } else {
            MIN_TIME_YEARS
        };
        let volatility = if inputs.volatility.is_finite() {
            inputs.volatility.clamp(MIN_VOLATILITY, MAX_VOLATILITY)
        } else {
            MIN_VOLATILITY
        };
        let rate = if inputs.rate.is_finite() { inputs.rate } else { 0.0 };
        let dividend_yield = if inputs.dividend_yield.is_finite() {
            inputs.dividend_yield
        } else {
            0.0
        };

        Ok(Self {
            option_type: inputs.option_type,
            spot: inputs.spot,
            strike: inputs.strike,
            time_years,
            rate,
            volatility,
            dividend_yield,
            quantity: inputs.quantity,
        })
    }

    #[inline]
    pub fn option_type(&self) -> OptionType {
        self.option_type
    }

    #[inline]
    pub fn spot(&self) -> f64 {
        self.spot
    }

    #[inline]
    pub fn strike(&self) -> f64 {
        self.strike
    }

    #[inline]
    pub fn time_years(&self) -> f64 {
        self.time_years
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[inline]
    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    #[inline]
    pub fn dividend_yield(&self) -> f64 {
        self.dividend_yield
    }

    #[inline]
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Copy with selected inputs replaced, re-clamped. Used for bump-and-reprice.
    pub fn bumped(&self, spot: f64, volatility: f64, rate: f64, time_years: f64) -> Self {
        Self {
            spot: spot.max(f64::MIN_POSITIVE),
            volatility: volatility.clamp(MIN_VOLATILITY, MAX_VOLATILITY),
            rate,
            time_years: time_years.max(f64::MIN_POSITIVE),
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    /// Per calendar day.
    pub theta: f64,
    /// Per 1 volatility point.
    pub vega: f64,
    /// Per 1 rate point.
    pub rho: f64,
}

/// Model-specific diagnostic payload.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelDiagnostics {
    Simulation(SimulationDiagnostics),
    Pde(PdeDiagnostics),
}

/// Uniform output of every model.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingResult {
    pub model: ModelKind,
    pub fair_value: f64,
    pub price: f64,
    pub breakeven: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeks: Option<Greeks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<ModelDiagnostics>,
    pub warnings: Vec<String>,
    /// Set only by `degraded`. A genuine zero price with a warning is not degraded.
    pub degraded: bool,
}

impl PricingResult {
    pub fn priced(model: ModelKind, ctx: &PricingContext, fair_value: f64) -> Self {
        Self {
            model,
            fair_value,
            price: fair_value * ctx.quantity() as f64,
            breakeven: ctx.option_type().breakeven(ctx.strike(), fair_value),
            greeks: None,
            diagnostics: None,
            warnings: Vec::new(),
            degraded: false,
        }
    }

    /// Zero-valued stand-in for a model that could not produce a price.
    pub fn degraded(model: ModelKind, ctx: &PricingContext, warning: impl Into<String>) -> Self {
        let mut result = Self::priced(model, ctx, 0.0);
        result.warnings.push(warning.into());
        result.degraded = true;
        result
    }

    pub fn with_greeks(mut self, greeks: Greeks) -> Self {
        self.greeks = Some(greeks);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: ModelDiagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// Per-request knobs for the numerical models. `None` means model default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSettings {
    pub lattice_steps: Option<u32>,
    pub simulation_paths: Option<u32>,
    pub simulation_seed: Option<u64>,
}

/// Single dispatch over the model kinds. Local models run on the blocking
/// pool; the PDE model is one outbound call. Never fails: problems come back
/// as degraded results so sibling models are unaffected.
pub async fn evaluate(
    kind: ModelKind,
    ctx: PricingContext,
    settings: ModelSettings,
    symbol: &str,
    pde_client: &PdeClient,
) -> PricingResult {
    let local = match kind {
        ModelKind::Analytic => tokio::task::spawn_blocking(move || analytic::price(&ctx)),
        ModelKind::Lattice => tokio::task::spawn_blocking(move || {
            lattice::price(&ctx, settings.lattice_steps)
        }),
        ModelKind::Simulation => tokio::task::spawn_blocking(move || {
            simulation::price(&ctx, settings.simulation_paths, settings.simulation_seed)
        }),
        ModelKind::Pde => return pde_client.price(symbol, &ctx).await,
    };

    settle(kind, &ctx, local.await)
}

/// A local model task that panicked or was cancelled becomes a degraded result.
fn settle(
    kind: ModelKind,
    ctx: &PricingContext,
    joined: Result<PricingResult, tokio::task::JoinError>,
) -> PricingResult {
    match joined {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(model = %kind, error = %e, "model task failed");
            PricingResult::degraded(kind, ctx, format!("{kind} model failed: {e}"))
        }
    }
}

#[cfg(test)]
pub(crate) fn test_context(
    option_type: OptionType,
    spot: f64,
    strike: f64,
    time_years: f64,
    rate: f64,
    volatility: f64,
) -> PricingContext {
    PricingContext::new(ContextInputs {
        option_type,
        spot,
        strike,
        time_years,
        rate,
        volatility,
        dividend_yield: 0.0,
        quantity: 1,
    })
    .expect("valid test context")
}
