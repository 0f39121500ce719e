use crate::models::pde::{PdeDiagnostics, PdeGreeks, PdeRequest, PdeResponse};
use crate::models::OptionType;

pub const DEFAULT_GRID_POINTS: usize = 400;
pub const DEFAULT_TIME_STEPS: usize = 800;
pub const DEFAULT_S_MAX_MULTIPLIER: f64 = 6.0;

/// Pivot magnitude floor for the Thomas sweep.
const PIVOT_FLOOR: f64 = 1e-12;
const RESIDUAL_WARN: f64 = 1e-3;
const RATE_BUMP: f64 = 1e-4;
/// Fraction of the upper price bound where boundary spread is measured.
const BOUNDARY_SAMPLE: f64 = 0.8;

#[derive(Debug, Clone, Copy)]
pub struct GridConfig {
    pub n_space: usize,
    pub n_time: usize,
    pub s_max_multiplier: f64,
}

impl GridConfig {
    pub fn from_request(req: &PdeRequest) -> Self {
        Self {
            n_space: req.grid_size.unwrap_or(DEFAULT_GRID_POINTS),
            n_time: req.time_steps.unwrap_or(DEFAULT_TIME_STEPS),
            s_max_multiplier: req.s_max_multiplier.unwrap_or(DEFAULT_S_MAX_MULTIPLIER),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Inputs {
    option_type: OptionType,
    strike: f64,
    expiry: f64,
    rate: f64,
    dividend_yield: f64,
    volatility: f64,
}

/// Grid solution at tau = expiry (calendar t = 0).
struct Solution {
    s_grid: Vec<f64>,
    values: Vec<f64>,
    /// Values one step before the end (tau = T - dtau), for theta.
    penultimate: Vec<f64>,
    residual_norm: f64,
}

/// Boundary values (V(0), V(s_max)) at time-to-expiry tau.
#[inline]
fn boundaries(inp: &Inputs, s_max: f64, tau: f64) -> (f64, f64) {
    match inp.option_type {
        OptionType::Call => (
            0.0,
            s_max * (-inp.dividend_yield * tau).exp() - inp.strike * (-inp.rate * tau).exp(),
        ),
        OptionType::Put => (inp.strike * (-inp.rate * tau).exp(), 0.0),
    }
}

/// Crank-Nicolson on the Black-Scholes PDE, marching in tau = T - t from
/// the terminal payoff. Each step solves one tridiagonal system.
fn crank_nicolson(inp: &Inputs, spot: f64, cfg: &GridConfig) -> Solution {
    let n = cfg.n_space;
    let s_max = cfg.s_max_multiplier * spot.max(inp.strike).max(1.0);
    let d_s = s_max / n as f64;
    let d_tau = inp.expiry / cfg.n_time as f64;

    let s_grid: Vec<f64> = (0..=n).map(|i| i as f64 * d_s).collect();
    let mut v_curr: Vec<f64> = s_grid
        .iter()
        .map(|&s| inp.option_type.intrinsic(s, inp.strike))
        .collect();
    let mut v_next = vec![0.0; n + 1];

    let sigma_sq = inp.volatility * inp.volatility;
    let carry = inp.rate - inp.dividend_yield;
    let m = n - 1;

    // Interior coefficients, i = 1..n-1 stored at index i-1.
    let mut alpha = Vec::with_capacity(m);
    let mut beta = Vec::with_capacity(m);
    let mut gamma = Vec::with_capacity(m);
    for i in 1..n {
        let i = i as f64;
        let diff = sigma_sq * i * i;
        let conv = carry * i;
        alpha.push(0.25 * d_tau * (diff - conv));
        beta.push(-0.5 * d_tau * (diff + inp.rate));
        gamma.push(0.25 * d_tau * (diff + conv));
    }

    // Implicit side: -alpha, 1 - beta, -gamma.
    let lower: Vec<f64> = (0..m).map(|k| if k == 0 { 0.0 } else { -alpha[k] }).collect();
    let diag: Vec<f64> = beta.iter().map(|b| 1.0 - b).collect();
    let upper: Vec<f64> = (0..m).map(|k| if k + 1 == m { 0.0 } else { -gamma[k] }).collect();

    let mut rhs = vec![0.0; m];
    let mut residual_norm: f64 = 0.0;
    let mut penultimate = v_curr.clone();

    for step in 0..cfg.n_time {
        let tau = step as f64 * d_tau;
        let tau_next = tau + d_tau;

        let (lo, hi) = boundaries(inp, s_max, tau);
        v_curr[0] = lo;
        v_curr[n] = hi;
        let (lo_next, hi_next) = boundaries(inp, s_max, tau_next);

        for k in 0..m {
            rhs[k] = alpha[k] * v_curr[k]
                + (1.0 + beta[k]) * v_curr[k + 1]
                + gamma[k] * v_curr[k + 2];
        }
        rhs[0] += alpha[0] * lo_next;
        rhs[m - 1] += gamma[m - 1] * hi_next;

        let interior = solve_tridiagonal(&lower, &diag, &upper, &rhs);

        v_next[0] = lo_next;
        v_next[n] = hi_next;
        v_next[1..n].copy_from_slice(&interior);

        for k in 0..m {
            let lhs = lower[k] * if k > 0 { interior[k - 1] } else { 0.0 }
                + diag[k] * interior[k]
                + upper[k] * if k + 1 < m { interior[k + 1] } else { 0.0 };
            residual_norm = residual_norm.max((lhs - rhs[k]).abs());
        }

        if step + 1 == cfg.n_time {
            penultimate.copy_from_slice(&v_curr);
        }
        std::mem::swap(&mut v_curr, &mut v_next);
    }

    Solution {
        penultimate,
        s_grid,
        values: v_curr,
        residual_norm,
    }
}

/// Thomas algorithm for a tridiagonal system. `lower[0]` and `upper[n-1]`
/// are ignored. Near-zero pivots are pushed away from zero, keeping sign.
pub fn solve_tridiagonal(lower: &[f64], diag: &[f64], upper: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    if n == 0 {
        return Vec::new();
    }

    let guard = |d: f64| {
        if d.abs() < PIVOT_FLOOR {
            if d >= 0.0 { PIVOT_FLOOR } else { -PIVOT_FLOOR }
        } else {
            d
        }
    };

    let mut c_prime = vec![0.0; n];
    let mut d_prime = vec![0.0; n];

    let denom = guard(diag[0]);
    d_prime[0] = rhs[0] / denom;
    if n > 1 {
        c_prime[0] = upper[0] / denom;
    }

    for i in 1..n {
        let denom = guard(diag[i] - lower[i] * c_prime[i - 1]);
        if i < n - 1 {
            c_prime[i] = upper[i] / denom;
        }
        d_prime[i] = (rhs[i] - lower[i] * d_prime[i - 1]) / denom;
    }

    let mut x = vec![0.0; n];
    x[n - 1] = d_prime[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = d_prime[i] - c_prime[i] * x[i + 1];
    }
    x
}

/// Linear interpolation of grid values at `spot`, flat beyond the ends.
fn interpolate(s_grid: &[f64], values: &[f64], spot: f64) -> f64 {
    let last = s_grid.len() - 1;
    if spot <= s_grid[0] {
        return values[0];
    }
    if spot >= s_grid[last] {
        return values[last];
    }
    let idx = s_grid.partition_point(|&s| s <= spot).min(last);
    let (s0, s1) = (s_grid[idx - 1], s_grid[idx]);
    let w = (spot - s0) / (s1 - s0);
    values[idx - 1] * (1.0 - w) + values[idx] * w
}

/// Central finite differences at the node nearest `spot`, with delta carried
/// from the node to `spot` using gamma: (delta, gamma).
fn grid_derivatives(s_grid: &[f64], values: &[f64], spot: f64) -> Option<(f64, f64)> {
    if values.len() < 3 {
        return None;
    }
    let d_s = s_grid[1] - s_grid[0];
    let idx = ((spot - s_grid[0]) / d_s).round().clamp(1.0, (values.len() - 2) as f64) as usize;
    let (v_m, v_0, v_p) = (values[idx - 1], values[idx], values[idx + 1]);
    let gamma = (v_p - 2.0 * v_0 + v_m) / (d_s * d_s);
    let delta = (v_p - v_m) / (2.0 * d_s) + gamma * (spot - s_grid[idx]);
    Some((delta, gamma))
}

/// Gap between the solution at 80% of the upper bound and the discounted
/// forward payoff it should have converged to there. The lower boundary is
/// exact (S = 0 is absorbing); the upper one is an approximation, and a large
/// gap means the grid is too narrow for the contract.
fn boundary_spread(inp: &Inputs, sol: &Solution) -> f64 {
    let n = sol.values.len() - 1;
    let node = ((n as f64) * BOUNDARY_SAMPLE).round() as usize;
    let s = sol.s_grid[node];
    let t = inp.expiry;
    let forward = s * (-inp.dividend_yield * t).exp() - inp.strike * (-inp.rate * t).exp();
    let asymptote = match inp.option_type {
        OptionType::Call => forward.max(0.0),
        OptionType::Put => (-forward).max(0.0),
    };
    (sol.values[node] - asymptote).abs()
}

/// Full pricing run: value, Greeks, diagnostics and warnings.
/// Theta is per year and vega/rho per unit, as the wire contract specifies.
pub fn solve(req: &PdeRequest) -> PdeResponse {
    let started = std::time::Instant::now();
    let cfg = GridConfig::from_request(req);
    let inp = Inputs {
        option_type: req.option_type,
        strike: req.strike,
        expiry: req.expiry,
        rate: req.risk_free_rate,
        dividend_yield: req.dividend_yield,
        volatility: req.volatility,
    };

    let sol = crank_nicolson(&inp, req.spot, &cfg);
    let fair_value = interpolate(&sol.s_grid, &sol.values, req.spot);
    let (delta, gamma) = match grid_derivatives(&sol.s_grid, &sol.values, req.spot) {
        Some((d, g)) => (Some(d), Some(g)),
        None => (None, None),
    };

    let dt = req.expiry / cfg.n_time as f64;
    // Calendar theta: the option one step shorter minus today's value.
    let theta = (dt > 0.0).then(|| {
        let shorter = interpolate(&sol.s_grid, &sol.penultimate, req.spot);
        (shorter - fair_value) / dt
    });

    let reprice = |vol: f64, rate: f64| {
        let bumped = Inputs {
            volatility: vol.max(1e-4),
            rate,
            ..inp
        };
        let s = crank_nicolson(&bumped, req.spot, &cfg);
        interpolate(&s.s_grid, &s.values, req.spot)
    };

    let vol_bump = (0.01 * req.volatility).max(1e-4);
    let vega = (reprice(req.volatility + vol_bump, req.risk_free_rate)
        - reprice(req.volatility - vol_bump, req.risk_free_rate))
        / (2.0 * vol_bump);
    let rho = (reprice(req.volatility, req.risk_free_rate + RATE_BUMP)
        - reprice(req.volatility, req.risk_free_rate - RATE_BUMP))
        / (2.0 * RATE_BUMP);

    let spread = boundary_spread(&inp, &sol);
    let mut warnings = Vec::new();
    if sol.residual_norm > RESIDUAL_WARN {
        warnings.push(format!(
            "High residual norm detected ({:.2e}); consider increasing grid resolution.",
            sol.residual_norm
        ));
    }
    if spread > (0.05 * fair_value).max(1.0) {
        warnings.push(
            "Boundary spread is large; increase s_max_multiplier or check inputs.".to_string(),
        );
    }

    let s_max = sol.s_grid[sol.s_grid.len() - 1];
    PdeResponse {
        symbol: req.symbol.to_uppercase(),
        option_type: req.option_type,
        fair_value,
        price: fair_value * req.quantity as f64,
        quantity: req.quantity,
        greeks: PdeGreeks {
            delta,
            gamma,
            theta,
            vega: Some(vega).filter(|v| v.is_finite()),
            rho: Some(rho).filter(|v| v.is_finite()),
        },
        diagnostics: PdeDiagnostics {
            grid_points: cfg.n_space,
            time_steps: cfg.n_time,
            residual_norm: sol.residual_norm,
            runtime_ms: Some(started.elapsed().as_secs_f64() * 1000.0),
            boundary_spread: spread,
            s_max,
        },
        warnings,
    }
}

/// Field-level validation mirroring the wire contract.
pub fn validate(req: &PdeRequest) -> Vec<crate::errors::FieldError> {
    use crate::errors::FieldError;
    let mut errors = Vec::new();
    if req.symbol.trim().is_empty() {
        errors.push(FieldError::new("symbol", "must not be empty"));
    }
    let positive = [
        ("spot", req.spot),
        ("strike", req.strike),
        ("expiry", req.expiry),
        ("volatility", req.volatility),
    ];
    for (field, value) in positive {
        if !(value.is_finite() && value > 0.0) {
            errors.push(FieldError::new(field, "must be a positive number"));
        }
    }
    if !req.risk_free_rate.is_finite() {
        errors.push(FieldError::new("risk_free_rate", "must be a finite number"));
    }
    if !req.dividend_yield.is_finite() {
        errors.push(FieldError::new("dividend_yield", "must be a finite number"));
    }
    if req.quantity == 0 {
        errors.push(FieldError::new("quantity", "must be positive"));
    }
    if let Some(g) = req.grid_size {
        if !(50..=2000).contains(&g) {
            errors.push(FieldError::new("grid_size", "must be between 50 and 2000"));
        }
    }
    if let Some(t) = req.time_steps {
        if !(50..=4000).contains(&t) {
            errors.push(FieldError::new("time_steps", "must be between 50 and 4000"));
        }
    }
    if let Some(m) = req.s_max_multiplier {
        if !(m > 2.0 && m <= 20.0) {
            errors.push(FieldError::new("s_max_multiplier", "must be in (2, 20]"));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{analytic, test_context};

    fn request(option_type: OptionType, spot: f64, strike: f64) -> PdeRequest {
        PdeRequest {
            symbol: "aapl".into(),
            option_type,
            spot,
            strike,
            expiry: 1.0,
            volatility: 0.2,
            risk_free_rate: 0.05,
            dividend_yield: 0.0,
            quantity: 3,
            grid_size: None,
            time_steps: None,
            s_max_multiplier: None,
        }
    }

    #[test]
    fn test_thomas_solves_small_system() {
        // [2 1 0; 1 2 1; 0 1 2] x = [4 8 8] -> x = [1 2 3]
        let x = solve_tridiagonal(
            &[0.0, 1.0, 1.0],
            &[2.0, 2.0, 2.0],
            &[1.0, 1.0, 0.0],
            &[4.0, 8.0, 8.0],
        );
        for (got, want) in x.iter().zip([1.0, 2.0, 3.0]) {
            assert!((got - want).abs() < 1e-12);
        }
        assert!(solve_tridiagonal(&[], &[], &[], &[]).is_empty());
    }

    #[test]
    fn test_call_matches_black_scholes() {
        let resp = solve(&request(OptionType::Call, 100.0, 100.0));
        let ctx = test_context(OptionType::Call, 100.0, 100.0, 1.0, 0.05, 0.2);
        let exact = analytic::fair_value(&ctx);
        assert!((resp.fair_value - exact).abs() < 0.05, "pde={} bs={exact}", resp.fair_value);
        assert_eq!(resp.symbol, "AAPL");
        assert!((resp.price - 3.0 * resp.fair_value).abs() < 1e-12);
        assert!(resp.diagnostics.residual_norm < 1e-8);
        assert_eq!(resp.diagnostics.grid_points, DEFAULT_GRID_POINTS);
        assert!((resp.diagnostics.s_max - 600.0).abs() < 1e-9);
        assert!(resp.warnings.is_empty(), "warnings: {:?}", resp.warnings);
    }

    #[test]
    fn test_put_and_greeks_match_black_scholes() {
        let ctx = test_context(OptionType::Put, 100.0, 105.0, 1.0, 0.05, 0.2);
        let resp = solve(&request(OptionType::Put, 100.0, 105.0));
        let exact = analytic::fair_value(&ctx);
        let g = analytic::greeks(&ctx);
        assert!((resp.fair_value - exact).abs() < 0.05, "pde={} bs={exact}", resp.fair_value);

        let greeks = &resp.greeks;
        assert!((greeks.delta.unwrap() - g.delta).abs() < 0.01);
        assert!((greeks.gamma.unwrap() - g.gamma).abs() < 0.002);
        // wire units: theta per year, vega and rho per unit
        assert!((greeks.theta.unwrap() / 365.0 - g.theta).abs() < 0.001);
        assert!((greeks.vega.unwrap() / 100.0 - g.vega).abs() < 0.01);
        assert!((greeks.rho.unwrap() / 100.0 - g.rho).abs() < 0.01);
    }

    #[test]
    fn test_narrow_grid_flags_boundary() {
        let mut req = request(OptionType::Call, 100.0, 100.0);
        req.volatility = 1.5;
        req.s_max_multiplier = Some(2.5);
        let resp = solve(&req);
        assert!(resp.warnings.iter().any(|w| w.contains("Boundary spread")), "{:?}", resp.warnings);
    }

    #[test]
    fn test_validation_reports_each_field() {
        let mut req = request(OptionType::Call, -1.0, 100.0);
        req.symbol = " ".into();
        req.grid_size = Some(10);
        req.quantity = 0;
        let errors = validate(&req);
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["symbol", "spot", "quantity", "grid_size"]);
        assert!(validate(&request(OptionType::Put, 100.0, 100.0)).is_empty());
    }
}
