use super::{Greeks, ModelKind, PricingContext, PricingResult};

pub const DEFAULT_STEPS: u32 = 100;
pub const MIN_STEPS: u32 = 10;
pub const MAX_STEPS: u32 = 1000;

/// Greeks always come from this tree depth, whatever the caller's step count.
/// Changing any of the constants below changes reported Greek values.
pub const GREEK_STEPS: u32 = 100;
/// Relative spot bump for delta/gamma.
pub const SPOT_BUMP_PCT: f64 = 0.01;
/// Absolute volatility bump for vega.
pub const VOL_BUMP: f64 = 0.01;
/// Absolute rate bump for rho.
pub const RATE_BUMP: f64 = 0.01;
/// One calendar day, backward time bump for theta.
pub const TIME_BUMP: f64 = 1.0 / 365.0;

/// Node log-prices are held inside +/- this bound so every node stays finite.
/// Nodes that far out carry no measurable probability.
const LOG_PRICE_LIMIT: f64 = 690.0;

/// Cox-Ross-Rubinstein binomial tree.
///
/// u = e^{sigma sqrt(dt)}, d = 1/u, p = (e^{(r-q)dt} - d) / (u - d)
///
/// Backward induction takes max(continuation, intrinsic) at every node, so
/// the routine is American-capable. Greeks come from bump-and-reprice on a
/// fixed 100-step tree: central differences for delta, gamma, vega and rho,
/// a forward difference for theta.
pub fn price(ctx: &PricingContext, steps: Option<u32>) -> PricingResult {
    let steps = steps.unwrap_or(DEFAULT_STEPS).clamp(MIN_STEPS, MAX_STEPS);
    let (fair_value, clamped) = tree_value(ctx, steps);

    let mut result =
        PricingResult::priced(ModelKind::Lattice, ctx, fair_value).with_greeks(bump_greeks(ctx));
    if clamped {
        result = result.with_warning(format!(
            "risk-neutral probability outside [0, 1] at {steps} steps; clamped (increase step count)"
        ));
    }
    result
}

/// Tree value and whether the risk-neutral probability had to be clamped.
pub fn tree_value(ctx: &PricingContext, steps: u32) -> (f64, bool) {
    let n = steps as usize;
    let dt = ctx.time_years() / n as f64;
    let u = (ctx.volatility() * dt.sqrt()).exp();
    let d = 1.0 / u;
    let growth = ((ctx.rate() - ctx.dividend_yield()) * dt).exp();
    let raw_p = (growth - d) / (u - d);
    let p = if raw_p.is_finite() { raw_p.clamp(0.0, 1.0) } else { 0.5 };
    let clamped = p != raw_p;
    let disc = (-ctx.rate() * dt).exp();
    let disc_p = disc * p;
    let disc_1mp = disc * (1.0 - p);

    let option_type = ctx.option_type();
    let strike = ctx.strike();
    // Node prices in log space: spot * e^{k * sigma sqrt(dt)} with k = 2j - i.
    // Powers of u or d underflow/overflow on long-dated, high-vol trees.
    let log_spot = ctx.spot().ln();
    let jump = ctx.volatility() * dt.sqrt();
    let node_price = |level: usize, j: usize| {
        let k = 2.0 * j as f64 - level as f64;
        (log_spot + k * jump).clamp(-LOG_PRICE_LIMIT, LOG_PRICE_LIMIT).exp()
    };

    let mut values: Vec<f64> = (0..=n)
        .map(|j| option_type.intrinsic(node_price(n, j), strike))
        .collect();

    for i in (0..n).rev() {
        for j in 0..=i {
            let continuation = disc_p * values[j + 1] + disc_1mp * values[j];
            values[j] = continuation.max(option_type.intrinsic(node_price(i, j), strike));
        }
    }

    (values[0], clamped)
}

fn bump_greeks(ctx: &PricingContext) -> Greeks {
    let value = |c: &PricingContext| tree_value(c, GREEK_STEPS).0;
    let (s, sigma, r, t) = (ctx.spot(), ctx.volatility(), ctx.rate(), ctx.time_years());

    let base = value(ctx);

    let h = s * SPOT_BUMP_PCT;
    let up = value(&ctx.bumped(s + h, sigma, r, t));
    let down = value(&ctx.bumped(s - h, sigma, r, t));
    let delta = (up - down) / (2.0 * h);
    let gamma = (up - 2.0 * base + down) / (h * h);

    // The context clamp may shorten the lower leg near the volatility floor.
    let vol_up = ctx.bumped(s, sigma + VOL_BUMP, r, t);
    let vol_down = ctx.bumped(s, sigma - VOL_BUMP, r, t);
    let vol_span = vol_up.volatility() - vol_down.volatility();
    let vega = (value(&vol_up) - value(&vol_down)) / vol_span / 100.0;

    let rho = (value(&ctx.bumped(s, sigma, r + RATE_BUMP, t))
        - value(&ctx.bumped(s, sigma, r - RATE_BUMP, t)))
        / (2.0 * RATE_BUMP)
        / 100.0;

    let t_short = (t - TIME_BUMP).max(TIME_BUMP * 1e-3);
    let dt = t - t_short;
    let theta = if dt > 0.0 {
        (value(&ctx.bumped(s, sigma, r, t_short)) - base) / dt / 365.0
    } else {
        0.0
    };

    Greeks {
        delta,
        gamma,
        theta,
        vega,
        rho,
    }
}
