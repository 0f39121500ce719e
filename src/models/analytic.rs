use super::normal::{norm_cdf, norm_pdf};
use super::{Greeks, ModelKind, OptionType, PricingContext, PricingResult};

/// Black-Scholes-Merton closed form with continuous dividend yield.
///
/// d1 = (ln(S/K) + (r - q + sigma^2/2) T) / (sigma sqrt(T))
/// d2 = d1 - sigma sqrt(T)
/// C  = S e^{-qT} N(d1) - K e^{-rT} N(d2)
/// P  = K e^{-rT} N(-d2) - S e^{-qT} N(-d1)
///
/// Volatility and time arrive clamped from the context, so the formula is
/// always finite.
pub fn price(ctx: &PricingContext) -> PricingResult {
    let fair_value = fair_value(ctx);
    PricingResult::priced(ModelKind::Analytic, ctx, fair_value).with_greeks(greeks(ctx))
}

#[inline]
fn d1_d2(ctx: &PricingContext) -> (f64, f64) {
    let t = ctx.time_years();
    let sigma_sqrt_t = ctx.volatility() * t.sqrt();
    let d1 = ((ctx.spot() / ctx.strike()).ln()
        + (ctx.rate() - ctx.dividend_yield() + 0.5 * ctx.volatility() * ctx.volatility()) * t)
        / sigma_sqrt_t;
    (d1, d1 - sigma_sqrt_t)
}

pub fn fair_value(ctx: &PricingContext) -> f64 {
    let t = ctx.time_years();
    let (d1, d2) = d1_d2(ctx);
    let disc_spot = ctx.spot() * (-ctx.dividend_yield() * t).exp();
    let disc_strike = ctx.strike() * (-ctx.rate() * t).exp();

    let value = match ctx.option_type() {
        OptionType::Call => disc_spot * norm_cdf(d1) - disc_strike * norm_cdf(d2),
        OptionType::Put => disc_strike * norm_cdf(-d2) - disc_spot * norm_cdf(-d1),
    };
    value.max(0.0)
}

pub fn greeks(ctx: &PricingContext) -> Greeks {
    let t = ctx.time_years();
    let sqrt_t = t.sqrt();
    let sigma = ctx.volatility();
    let (d1, d2) = d1_d2(ctx);
    let div_df = (-ctx.dividend_yield() * t).exp();
    let rate_df = (-ctx.rate() * t).exp();
    let pdf_d1 = norm_pdf(d1);

    let gamma = div_df * pdf_d1 / (ctx.spot() * sigma * sqrt_t);
    let vega = ctx.spot() * div_df * pdf_d1 * sqrt_t / 100.0;
    let decay = -ctx.spot() * div_df * pdf_d1 * sigma / (2.0 * sqrt_t);

    let (delta, theta_annual, rho) = match ctx.option_type() {
        OptionType::Call => (
            div_df * norm_cdf(d1),
            decay - ctx.rate() * ctx.strike() * rate_df * norm_cdf(d2)
                + ctx.dividend_yield() * ctx.spot() * div_df * norm_cdf(d1),
            ctx.strike() * t * rate_df * norm_cdf(d2) / 100.0,
        ),
        OptionType::Put => (
            div_df * (norm_cdf(d1) - 1.0),
            decay + ctx.rate() * ctx.strike() * rate_df * norm_cdf(-d2)
                - ctx.dividend_yield() * ctx.spot() * div_df * norm_cdf(-d1),
            -ctx.strike() * t * rate_df * norm_cdf(-d2) / 100.0,
        ),
    };

    Greeks {
        delta,
        gamma,
        theta: theta_annual / 365.0,
        vega,
        rho,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{test_context, ContextInputs};
    use statrs::distribution::{ContinuousCDF, Normal};

    /// Textbook value computed independently with statrs' normal CDF.
    fn reference_call(s: f64, k: f64, t: f64, r: f64, sigma: f64) -> f64 {
        let n = Normal::standard();
        let d1 = ((s / k).ln() + (r + sigma * sigma / 2.0) * t) / (sigma * t.sqrt());
        let d2 = d1 - sigma * t.sqrt();
        s * n.cdf(d1) - k * (-r * t).exp() * n.cdf(d2)
    }

    #[test]
    fn test_hull_textbook_values() {
        // Hull: S=42, K=40, r=10%, sigma=20%, T=0.5 -> call 4.76, put 0.81
        let call = fair_value(&test_context(OptionType::Call, 42.0, 40.0, 0.5, 0.10, 0.20));
        let put = fair_value(&test_context(OptionType::Put, 42.0, 40.0, 0.5, 0.10, 0.20));
        assert!((call - 4.7594).abs() < 1e-3, "call={call}");
        assert!((put - 0.8086).abs() < 1e-3, "put={put}");
    }

    #[test]
    fn test_aapl_scenario_matches_reference() {
        let ctx = test_context(OptionType::Call, 155.0, 150.0, 0.5, 0.05, 0.25);
        let result = price(&ctx);
        let expected = reference_call(155.0, 150.0, 0.5, 0.05, 0.25);
        assert!(
            ((result.fair_value - expected) / expected).abs() < 1e-9,
            "fair={} expected={expected}",
            result.fair_value
        );
        assert_eq!(result.breakeven, 150.0 + result.fair_value);
    }

    #[test]
    fn test_put_call_parity_with_yield() {
        let mk = |option_type| {
            crate::models::PricingContext::new(ContextInputs {
                option_type,
                spot: 100.0,
                strike: 105.0,
                time_years: 0.75,
                rate: 0.04,
                volatility: 0.3,
                dividend_yield: 0.02,
                quantity: 1,
            })
            .unwrap()
        };
        let c = fair_value(&mk(OptionType::Call));
        let p = fair_value(&mk(OptionType::Put));
        let parity = 100.0 * (-0.02_f64 * 0.75).exp() - 105.0 * (-0.04_f64 * 0.75).exp();
        assert!((c - p - parity).abs() < 1e-10);
    }

    #[test]
    fn test_monotone_in_vol_spot_and_strike() {
        let mut prev = 0.0;
        for i in 1..=20 {
            let vol = i as f64 * 0.05;
            let v = fair_value(&test_context(OptionType::Call, 100.0, 100.0, 1.0, 0.03, vol));
            assert!(v > prev, "call not increasing in vol at step {i}");
            prev = v;
        }
        let mut prev = 0.0;
        for i in 1..=20 {
            let vol = i as f64 * 0.05;
            let v = fair_value(&test_context(OptionType::Put, 100.0, 100.0, 1.0, 0.03, vol));
            assert!(v > prev, "put not increasing in vol at step {i}");
            prev = v;
        }
        let mut prev = 0.0;
        for spot in (60..=140).step_by(5) {
            let v = fair_value(&test_context(OptionType::Call, spot as f64, 100.0, 1.0, 0.03, 0.2));
            assert!(v > prev, "call not increasing in spot at {spot}");
            prev = v;
        }
        let mut prev = f64::INFINITY;
        for strike in (60..=140).step_by(5) {
            let ctx = test_context(OptionType::Call, 100.0, strike as f64, 1.0, 0.03, 0.2);
            let v = fair_value(&ctx);
            assert!(v < prev, "call not decreasing in strike at {strike}");
            prev = v;
        }
    }

    #[test]
    fn test_greeks_against_bumps() {
        let ctx = test_context(OptionType::Call, 100.0, 100.0, 1.0, 0.05, 0.2);
        let g = greeks(&ctx);
        let h = 0.01;
        let up = fair_value(&ctx.bumped(100.0 + h, 0.2, 0.05, 1.0));
        let dn = fair_value(&ctx.bumped(100.0 - h, 0.2, 0.05, 1.0));
        assert!((g.delta - (up - dn) / (2.0 * h)).abs() < 1e-6);

        let vu = fair_value(&ctx.bumped(100.0, 0.2 + 1e-4, 0.05, 1.0));
        let vd = fair_value(&ctx.bumped(100.0, 0.2 - 1e-4, 0.05, 1.0));
        assert!((g.vega - (vu - vd) / (2e-4) / 100.0).abs() < 1e-6);

        // Hull: ATM call delta ~ 0.637, theta per day ~ -0.0176
        assert!((g.delta - 0.6368).abs() < 1e-3);
        assert!((g.theta - (-6.414 / 365.0)).abs() < 1e-3);
        assert!(g.gamma > 0.0 && g.rho > 0.0);
    }
}
