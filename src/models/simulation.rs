use super::rng::NormalRng;
use super::{ModelDiagnostics, ModelKind, PricingContext, PricingResult};

pub const DEFAULT_PATHS: u32 = 20_000;
pub const MIN_PATHS: u32 = 1_000;
pub const MAX_PATHS: u32 = 200_000;
/// Below this path count the estimate carries a stability warning.
pub const STABLE_PATHS: u32 = 5_000;
pub const STEPS_PER_YEAR: f64 = 252.0;
/// Ten years of daily steps. Longer expiries take coarser steps; the GBM
/// update is exact in distribution at any step size.
pub const MAX_STEPS: u32 = 2_520;
/// Discounted payoffs kept for display.
pub const SAMPLE_SIZE: usize = 1_000;

const PERCENTILES: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 95.0];

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Percentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub std_error: f64,
    pub percentiles: Percentiles,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationDiagnostics {
    pub paths: u32,
    pub steps: u32,
    pub seed: u64,
    /// First `SAMPLE_SIZE` discounted payoffs, in simulation order.
    pub payoff_sample: Vec<f64>,
    pub distribution: DistributionSummary,
}

/// Monte Carlo under risk-neutral GBM with daily steps.
///
/// S_{t+dt} = S_t exp((r - q - sigma^2/2) dt + sigma sqrt(dt) Z)
///
/// Fair value is the mean discounted terminal payoff. The seed defaults to the
/// current time; passing one makes the payoff sequence reproducible.
pub fn price(ctx: &PricingContext, paths: Option<u32>, seed: Option<u64>) -> PricingResult {
    let paths = paths.unwrap_or(DEFAULT_PATHS).clamp(MIN_PATHS, MAX_PATHS);
    let seed = seed.unwrap_or_else(|| chrono::Utc::now().timestamp_millis().unsigned_abs());

    let run = simulate(ctx, paths, seed);
    let summary = summarize(&run.payoffs);

    let mut result = PricingResult::priced(ModelKind::Simulation, ctx, summary.mean);
    if run.daily_steps > MAX_STEPS {
        result = result.with_warning(format!(
            "{} daily steps exceed the {MAX_STEPS}-step cap; simulated with coarser steps",
            run.daily_steps
        ));
    }
    if paths < STABLE_PATHS {
        result = result.with_warning(format!(
            "only {paths} paths simulated; increase path count for stability"
        ));
    }

    let mut payoff_sample = run.payoffs;
    payoff_sample.truncate(SAMPLE_SIZE);

    result.with_diagnostics(ModelDiagnostics::Simulation(SimulationDiagnostics {
        paths,
        steps: run.steps,
        seed,
        payoff_sample,
        distribution: summary,
    }))
}

struct SimulationRun {
    steps: u32,
    /// Step count daily stepping would have needed.
    daily_steps: u32,
    payoffs: Vec<f64>,
}

fn simulate(ctx: &PricingContext, paths: u32, seed: u64) -> SimulationRun {
    let t = ctx.time_years();
    let daily_steps = ((t * STEPS_PER_YEAR).ceil() as u32).max(1);
    let steps = daily_steps.min(MAX_STEPS);
    let dt = t / steps as f64;
    let sigma = ctx.volatility();
    let drift = (ctx.rate() - ctx.dividend_yield() - 0.5 * sigma * sigma) * dt;
    let diffusion = sigma * dt.sqrt();
    let discount = (-ctx.rate() * t).exp();

    let mut rng = NormalRng::new(seed);
    let mut payoffs = Vec::with_capacity(paths as usize);

    for _ in 0..paths {
        let mut log_s = 0.0;
        for _ in 0..steps {
            log_s += drift + diffusion * rng.next_normal();
        }
        let terminal = ctx.spot() * log_s.exp();
        payoffs.push(discount * ctx.option_type().intrinsic(terminal, ctx.strike()));
    }

    SimulationRun {
        steps,
        daily_steps,
        payoffs,
    }
}

fn summarize(payoffs: &[f64]) -> DistributionSummary {
    let n = payoffs.len() as f64;
    let mean = payoffs.iter().sum::<f64>() / n;
    let var = if payoffs.len() > 1 {
        payoffs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    let std_dev = var.sqrt();

    let mut sorted = payoffs.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let [p5, p25, p50, p75, p95] = PERCENTILES.map(|p| nearest_rank(&sorted, p));

    DistributionSummary {
        mean,
        std_dev,
        std_error: std_dev / n.sqrt(),
        percentiles: Percentiles {
            p5,
            p25,
            p50,
            p75,
            p95,
        },
    }
}

/// Nearest-rank percentile of an ascending slice: element ceil(p/100 * n).
fn nearest_rank(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{analytic, test_context, OptionType};

    fn diagnostics(result: &PricingResult) -> &SimulationDiagnostics {
        match result.diagnostics.as_ref() {
            Some(ModelDiagnostics::Simulation(d)) => d,
            other => panic!("expected simulation diagnostics, got {other:?}"),
        }
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let ctx = test_context(OptionType::Call, 100.0, 105.0, 0.5, 0.04, 0.3);
        let a = price(&ctx, Some(2_000), Some(7));
        let b = price(&ctx, Some(2_000), Some(7));
        assert_eq!(a.fair_value.to_bits(), b.fair_value.to_bits());
        let (da, db) = (diagnostics(&a), diagnostics(&b));
        assert_eq!(da.payoff_sample, db.payoff_sample);
        assert_eq!(da.distribution.std_dev.to_bits(), db.distribution.std_dev.to_bits());
        assert_eq!(
            da.distribution.percentiles.p50.to_bits(),
            db.distribution.percentiles.p50.to_bits()
        );

        let c = price(&ctx, Some(2_000), Some(8));
        assert_ne!(a.fair_value.to_bits(), c.fair_value.to_bits());
    }

    #[test]
    fn test_converges_within_statistical_tolerance() {
        let ctx = test_context(OptionType::Call, 100.0, 100.0, 0.25, 0.05, 0.2);
        let exact = analytic::fair_value(&ctx);
        for paths in [5_000, 50_000] {
            let result = price(&ctx, Some(paths), Some(12345));
            let se = diagnostics(&result).distribution.std_error;
            assert!(se > 0.0 && se < 10.0 / (paths as f64).sqrt() * 2.0);
            assert!(
                (result.fair_value - exact).abs() < 4.0 * se,
                "paths={paths} mc={} bs={exact} se={se}",
                result.fair_value
            );
        }
    }

    #[test]
    fn test_put_converges() {
        let ctx = test_context(OptionType::Put, 100.0, 95.0, 0.5, 0.03, 0.25);
        let exact = analytic::fair_value(&ctx);
        let result = price(&ctx, Some(40_000), Some(99));
        let se = diagnostics(&result).distribution.std_error;
        assert!((result.fair_value - exact).abs() < 4.0 * se);
    }

    #[test]
    fn test_low_path_count_warns_and_clamps() {
        let ctx = test_context(OptionType::Call, 100.0, 100.0, 0.1, 0.05, 0.2);
        let result = price(&ctx, Some(10), Some(1));
        let d = diagnostics(&result);
        assert_eq!(d.paths, MIN_PATHS);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("increase path count"));
        assert!(result.greeks.is_none());

        let result = price(&ctx, Some(5_000), Some(1));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_sample_and_steps() {
        let ctx = test_context(OptionType::Call, 100.0, 100.0, 0.5, 0.05, 0.2);
        let result = price(&ctx, Some(3_000), Some(3));
        let d = diagnostics(&result);
        assert_eq!(d.payoff_sample.len(), SAMPLE_SIZE);
        assert_eq!(d.steps, 126);
        assert!(d.payoff_sample.iter().all(|p| *p >= 0.0));
        let pct = &d.distribution.percentiles;
        let ordered = [pct.p5, pct.p25, pct.p50, pct.p75, pct.p95];
        assert!(ordered.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_long_expiry_caps_steps() {
        let ctx = test_context(OptionType::Call, 100.0, 100.0, 50.0, 0.02, 0.2);
        let result = price(&ctx, Some(5_000), Some(5));
        let d = diagnostics(&result);
        assert_eq!(d.steps, MAX_STEPS);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("12600 daily steps"));
        assert!(result.fair_value.is_finite() && result.fair_value > 0.0);
    }

    #[test]
    fn test_nearest_rank() {
        let data = [15.0, 20.0, 35.0, 40.0, 50.0];
        assert_eq!(nearest_rank(&data, 5.0), 15.0);
        assert_eq!(nearest_rank(&data, 30.0), 20.0);
        assert_eq!(nearest_rank(&data, 40.0), 20.0);
        assert_eq!(nearest_rank(&data, 50.0), 35.0);
        assert_eq!(nearest_rank(&data, 100.0), 50.0);
    }
}
