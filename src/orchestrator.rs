use crate::errors::{FieldError, PricerError, PricerResult};
use crate::models::{
    self, ContextInputs, ModelKind, ModelSettings, OptionType, PricingContext, PricingResult,
};
use crate::provider::client::Resolved;
use crate::provider::reconcile::{self, OptionContractSummary};
use crate::state::{AppState, PerfCounters, RequestPhase};
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use smallvec::SmallVec;
use std::sync::Arc;

/// Volatility used when neither an override nor a listed contract supplies one.
pub const DEFAULT_VOLATILITY: f64 = 0.30;
pub const MAX_LATTICE_STEPS: u32 = 2_000;
pub const MAX_SIMULATION_PATHS: u32 = 500_000;

/// Inbound pricing request. Enum-like fields arrive as raw strings so a bad
/// value becomes a field-level validation error rather than a decode error.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRequest {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub option_type: String,
    #[serde(default)]
    pub strike: f64,
    #[serde(default)]
    pub expiration: String,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub lattice_steps: Option<i64>,
    #[serde(default)]
    pub simulation_paths: Option<i64>,
    #[serde(default)]
    pub simulation_seed: Option<i64>,
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default)]
    pub risk_free_rate: Option<f64>,
    #[serde(default)]
    pub dividend_yield: Option<f64>,
}

/// A request that passed validation. Every field is in range.
#[derive(Debug, Clone)]
pub struct ValidRequest {
    pub symbol: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiration: DateTime<Utc>,
    pub quantity: u32,
    pub models: SmallVec<[ModelKind; 4]>,
    pub settings: ModelSettings,
    pub volatility: Option<f64>,
    pub risk_free_rate: Option<f64>,
    pub dividend_yield: Option<f64>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingResponse {
    pub request_id: uuid::Uuid,
    pub symbol: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiration: DateTime<Utc>,
    pub spot_price: f64,
    pub implied_volatility: f64,
    pub risk_free_rate: f64,
    pub dividend_yield: f64,
    pub time_to_expiration: f64,
    pub quantity: u32,
    pub contract: Option<OptionContractSummary>,
    pub results: Vec<PricingResult>,
    pub warnings: Vec<String>,
}

fn parse_model(name: &str) -> Option<ModelKind> {
    match name.trim().to_ascii_lowercase().as_str() {
        "analytic" => Some(ModelKind::Analytic),
        "lattice" => Some(ModelKind::Lattice),
        "simulation" => Some(ModelKind::Simulation),
        "pde" => Some(ModelKind::Pde),
        _ => None,
    }
}

fn parse_option_type(name: &str) -> Option<OptionType> {
    match name.trim().to_ascii_lowercase().as_str() {
        "call" => Some(OptionType::Call),
        "put" => Some(OptionType::Put),
        _ => None,
    }
}

/// Checks every field and reports all failures at once. Runs before any
/// credential check or network call.
pub fn validate(req: &PriceRequest) -> PricerResult<ValidRequest> {
    let mut errors = Vec::new();

    let symbol = req.symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        errors.push(FieldError::new("symbol", "must not be empty"));
    }

    let option_type = parse_option_type(&req.option_type);
    if option_type.is_none() {
        errors.push(FieldError::new("optionType", "must be 'call' or 'put'"));
    }

    if !(req.strike.is_finite() && req.strike > 0.0) {
        errors.push(FieldError::new("strike", "must be greater than 0"));
    }

    let expiration = match reconcile::parse_expiration(&req.expiration) {
        Ok(dt) => Some(dt),
        Err(PricerError::InvalidExpiration(msg)) => {
            errors.push(FieldError::new("expiration", msg));
            None
        }
        Err(e) => {
            errors.push(FieldError::new("expiration", e.to_string()));
            None
        }
    };

    let quantity = match req.quantity {
        None => Some(1),
        Some(q) => match u32::try_from(q) {
            Ok(q) if q > 0 => Some(q),
            _ => {
                errors.push(FieldError::new("quantity", "must be a positive integer"));
                None
            }
        },
    };

    let mut models: SmallVec<[ModelKind; 4]> = SmallVec::new();
    if req.models.is_empty() {
        errors.push(FieldError::new("models", "at least one model is required"));
    }
    for name in &req.models {
        match parse_model(name) {
            Some(kind) if !models.contains(&kind) => models.push(kind),
            Some(_) => {}
            None => errors.push(FieldError::new(
                "models",
                format!("unknown model '{name}'; expected analytic, lattice, simulation or pde"),
            )),
        }
    }

    let lattice_steps =
        bounded_count(req.lattice_steps, MAX_LATTICE_STEPS, "latticeSteps", &mut errors);
    let simulation_paths =
        bounded_count(req.simulation_paths, MAX_SIMULATION_PATHS, "simulationPaths", &mut errors);

    let simulation_seed = match req.simulation_seed {
        None => None,
        Some(seed) => match u64::try_from(seed) {
            Ok(seed) => Some(seed),
            Err(_) => {
                errors.push(FieldError::new("simulationSeed", "must be 0 or greater"));
                None
            }
        },
    };

    if let Some(v) = req.volatility {
        if !(v.is_finite() && v > 0.0) {
            errors.push(FieldError::new("volatility", "must be greater than 0"));
        }
    }
    if let Some(r) = req.risk_free_rate {
        if !r.is_finite() {
            errors.push(FieldError::new("riskFreeRate", "must be a finite number"));
        }
    }
    if let Some(q) = req.dividend_yield {
        if !(q.is_finite() && q >= 0.0) {
            errors.push(FieldError::new("dividendYield", "must be 0 or greater"));
        }
    }

    match (option_type, expiration, quantity) {
        (Some(option_type), Some(expiration), Some(quantity)) if errors.is_empty() => {
            Ok(ValidRequest {
                symbol,
                option_type,
                strike: req.strike,
                expiration,
                quantity,
                models,
                settings: ModelSettings {
                    lattice_steps,
                    simulation_paths,
                    simulation_seed,
                },
                volatility: req.volatility,
                risk_free_rate: req.risk_free_rate,
                dividend_yield: req.dividend_yield,
            })
        }
        _ => Err(PricerError::Validation(errors)),
    }
}

fn bounded_count(
    value: Option<i64>,
    max: u32,
    field: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<u32> {
    let v = value?;
    match u32::try_from(v) {
        Ok(n) if n > 0 && n <= max => Some(n),
        _ => {
            errors.push(FieldError::new(field, format!("must be between 1 and {max}")));
            None
        }
    }
}

/// Prices one request against the current clock.
pub async fn price(state: &Arc<AppState>, request: PriceRequest) -> PricerResult<PricingResponse> {
    price_at(state, request, Utc::now()).await
}

/// Full request lifecycle with an explicit valuation time.
pub async fn price_at(
    state: &Arc<AppState>,
    request: PriceRequest,
    now: DateTime<Utc>,
) -> PricerResult<PricingResponse> {
    let request_id = uuid::Uuid::new_v4();
    PerfCounters::bump(&state.counters.requests, 1);

    let outcome = run(state, request, request_id, now).await;
    if let Err(e) = &outcome {
        PerfCounters::bump(&state.counters.requests_failed, 1);
        tracing::warn!(request_id = %request_id, error = %e, "pricing request rejected");
    }
    outcome
}

async fn run(
    state: &Arc<AppState>,
    request: PriceRequest,
    request_id: uuid::Uuid,
    now: DateTime<Utc>,
) -> PricerResult<PricingResponse> {
    let req = validate(&request)?;
    state.config.require_api_key()?;

    // ── ResolvingInputs ──
    let mut phase = RequestPhase::ResolvingInputs;
    tracing::info!(
        request_id = %request_id,
        phase = %phase,
        symbol = %req.symbol,
        option_type = %req.option_type,
        strike = req.strike,
        models = ?req.models,
        "request accepted"
    );

    let market = &state.market;
    let expiry_day: NaiveDate = req.expiration.date_naive();

    let spot_fut = market.fetch_spot(&req.symbol);
    let rate_fut = async {
        match req.risk_free_rate {
            Some(r) => Resolved { value: r, note: None },
            None => {
                market
                    .fetch_risk_free_rate(&state.config.risk_free_series, state.config.rate_timeout)
                    .await
            }
        }
    };
    let yield_fut = async {
        match req.dividend_yield {
            Some(q) => Resolved { value: q, note: None },
            None => market.fetch_dividend_yield(&req.symbol).await,
        }
    };
    let contract_fut =
        market.fetch_contract(&req.symbol, expiry_day, req.option_type, req.strike);

    let (spot, rate, dividend, contract) =
        tokio::join!(spot_fut, rate_fut, yield_fut, contract_fut);
    let spot = spot?;

    let mut warnings: Vec<String> = [rate.note, dividend.note, contract.note]
        .into_iter()
        .flatten()
        .collect();
    let contract = contract.value;

    let volatility = match req.volatility {
        Some(v) => v,
        None => match contract.as_ref().and_then(|c| c.implied_volatility) {
            Some(iv) => iv,
            None => {
                warnings.push(format!(
                    "no implied volatility from a listed contract; using default {DEFAULT_VOLATILITY}"
                ));
                DEFAULT_VOLATILITY
            }
        },
    };

    let time_years = reconcile::time_to_expiration(req.expiration, now);
    let ctx = PricingContext::new(ContextInputs {
        option_type: req.option_type,
        spot,
        strike: req.strike,
        time_years,
        rate: rate.value,
        volatility,
        dividend_yield: dividend.value,
        quantity: req.quantity,
    })?;

    if !warnings.is_empty() {
        PerfCounters::bump(&state.counters.inputs_degraded, warnings.len() as u64);
    }

    // ── Pricing ──
    phase = RequestPhase::Pricing;
    tracing::info!(
        request_id = %request_id,
        phase = %phase,
        spot = ctx.spot(),
        volatility = ctx.volatility(),
        rate = ctx.rate(),
        dividend_yield = ctx.dividend_yield(),
        time_years = ctx.time_years(),
        degraded_inputs = warnings.len(),
        "inputs resolved"
    );

    let settings = req.settings;
    let symbol = req.symbol.as_str();
    let pde = &state.pde;
    let runs = req.models.iter().map(|&kind| async move {
        let started = std::time::Instant::now();
        let result = models::evaluate(kind, ctx, settings, symbol, pde).await;
        tracing::debug!(
            request_id = %request_id,
            model = %kind,
            fair_value = result.fair_value,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "model finished"
        );
        result
    });
    let results = join_all(runs).await;

    // ── Merging ──
    phase = RequestPhase::Merging;
    let degraded = results.iter().filter(|r| r.is_degraded()).count();
    PerfCounters::bump(&state.counters.model_runs, results.len() as u64);
    PerfCounters::bump(&state.counters.models_degraded, degraded as u64);
    tracing::info!(
        request_id = %request_id,
        phase = %phase,
        results = results.len(),
        degraded_models = degraded,
        "merging model results"
    );

    let response = PricingResponse {
        request_id,
        symbol: req.symbol,
        option_type: req.option_type,
        strike: req.strike,
        expiration: req.expiration,
        spot_price: ctx.spot(),
        implied_volatility: ctx.volatility(),
        risk_free_rate: ctx.rate(),
        dividend_yield: ctx.dividend_yield(),
        time_to_expiration: ctx.time_years(),
        quantity: ctx.quantity(),
        contract,
        results,
        warnings,
    };

    phase = RequestPhase::Complete;
    tracing::info!(request_id = %request_id, phase = %phase, "pricing complete");
    Ok(response)
}
