use super::types::{
    EconomicSeriesResponse, OptionChainResponse, ProfileResponse, QuoteResponse, RawContract,
};
use crate::errors::{PricerError, PricerResult};
use crate::models::{OptionType, MIN_TIME_YEARS};
use chrono::{DateTime, NaiveDate, Utc};

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// Normalized snapshot of the listed contract closest to the request.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionContractSummary {
    pub symbol: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    /// Fraction, never a percentage.
    pub implied_volatility: Option<f64>,
    pub last_price: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
}

/// Providers mix fractions (0.052) and percentages (5.2). Anything above 1
/// is read as a percentage. Idempotent on fractions.
#[inline]
pub fn normalize_fraction(value: f64) -> f64 {
    if value > 1.0 {
        value / 100.0
    } else {
        value
    }
}

#[inline]
fn finite_positive(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x > 0.0)
}

/// Current price, else previous close.
pub fn spot_from_quote(symbol: &str, quote: &QuoteResponse) -> PricerResult<f64> {
    finite_positive(quote.current_price)
        .or_else(|| finite_positive(quote.previous_close))
        .ok_or_else(|| PricerError::DataUnavailable(format!("no usable spot price for {symbol}")))
}

/// Most recent observation by date; the first usable one when no other is
/// strictly more recent (including when dates are missing or unparseable).
pub fn rate_from_series(series: &EconomicSeriesResponse) -> Option<f64> {
    let observations = series.data.as_deref()?;
    let mut best: Option<(Option<NaiveDate>, f64)> = None;

    for obs in observations {
        let Some(value) = obs.value.filter(|v| v.is_finite()) else {
            continue;
        };
        let date = obs.date.as_deref().and_then(parse_day);
        best = match best {
            None => Some((date, value)),
            Some((Some(best_date), _)) if date.is_some_and(|d| d > best_date) => {
                Some((date, value))
            }
            Some((None, _)) if date.is_some() => Some((date, value)),
            keep => keep,
        };
    }

    best.map(|(_, v)| normalize_fraction(v))
}

/// Yield as a fraction; 0 when absent or non-finite.
pub fn dividend_yield_from_profile(profile: &ProfileResponse) -> f64 {
    profile
        .dividend_yield
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(normalize_fraction)
        .unwrap_or(0.0)
}

/// Day-granularity parse of a provider date ("2025-01-17", RFC 3339, or a
/// date followed by a time of day).
pub fn parse_day(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    s.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

/// Parses the requested expiration. A bare date means midnight UTC.
pub fn parse_expiration(s: &str) -> PricerResult<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| PricerError::InvalidExpiration(format!("unparseable date '{s}'")))
}

/// Years from `now` to `expiration` on a 365.25-day year, floored at one day.
pub fn time_to_expiration(expiration: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let seconds = (expiration - now).num_milliseconds() as f64 / 1000.0;
    (seconds / SECONDS_PER_YEAR).max(MIN_TIME_YEARS)
}

/// Listed contract nearest to `strike` in the slice expiring on `expiration`.
/// First-seen wins on equal distance. `None` when nothing matches.
pub fn match_contract(
    chain: &OptionChainResponse,
    symbol: &str,
    expiration: NaiveDate,
    option_type: OptionType,
    strike: f64,
) -> Option<OptionContractSummary> {
    let slice = chain
        .data
        .as_deref()?
        .iter()
        .find(|s| s.expiration_date.as_deref().and_then(parse_day) == Some(expiration))?;

    let mut best: Option<(&RawContract, f64, f64)> = None;
    for contract in slice.contracts_for(option_type) {
        let Some(k) = contract.strike.filter(|k| k.is_finite()) else {
            continue;
        };
        let distance = (k - strike).abs();
        if best.map_or(true, |(_, _, d)| distance < d) {
            best = Some((contract, k, distance));
        }
    }

    let (contract, contract_strike, _) = best?;
    Some(OptionContractSummary {
        symbol: contract.contract_name.clone().unwrap_or_else(|| symbol.to_string()),
        expiration,
        strike: contract_strike,
        option_type,
        implied_volatility: finite_positive(contract.implied_volatility).map(normalize_fraction),
        last_price: contract.last_price,
        bid: contract.bid,
        ask: contract.ask,
        delta: contract.delta,
        gamma: contract.gamma,
        theta: contract.theta,
        vega: contract.vega,
    })
}
