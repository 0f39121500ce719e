use super::reconcile::{self, OptionContractSummary};
use super::types::*;
use crate::config::AppConfig;
use crate::errors::{PricerError, PricerResult};
use crate::models::OptionType;
use chrono::NaiveDate;
use reqwest::Client;
use std::time::Duration;

/// Fixed fallback when the rate series cannot be read.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.05;

/// A value resolved under a degrade-don't-fail policy. `note` explains the
/// fallback when one was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub note: Option<String>,
}

impl<T> Resolved<T> {
    fn fetched(value: T) -> Self {
        Self { value, note: None }
    }

    fn fallback(value: T, note: String) -> Self {
        Self { value, note: Some(note) }
    }
}

/// Market data REST client. All methods return Result or a Resolved
/// fallback, never panic.
#[derive(Clone)]
pub struct MarketDataClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl MarketDataClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .pool_max_idle_per_host(4)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.market_data_base_url,
            config.market_data_api_key.clone(),
            config.http_timeout,
        )
    }

    async fn auth_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> PricerResult<T> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PricerError::Config("missing env var: MARKET_DATA_API_KEY".into()))?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .header("Authorization", format!("Bearer {api_key}"))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PricerError::ProviderApi {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>().await.map_err(|e| PricerError::Parse(format!("GET {path}: {e}")))
    }

    // ── Raw endpoints ──

    pub async fn get_quote(&self, symbol: &str) -> PricerResult<QuoteResponse> {
        self.auth_get("/quote", &[("symbol", symbol)]).await
    }

    pub async fn get_profile(&self, symbol: &str) -> PricerResult<ProfileResponse> {
        self.auth_get("/stock/profile", &[("symbol", symbol)]).await
    }

    pub async fn get_economic_series(&self, key: &str) -> PricerResult<EconomicSeriesResponse> {
        self.auth_get("/economic", &[("code", key)]).await
    }

    pub async fn get_option_chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
    ) -> PricerResult<OptionChainResponse> {
        let date = expiration.format("%Y-%m-%d").to_string();
        self.auth_get("/stock/option-chain", &[("symbol", symbol), ("expiration", &date)])
            .await
    }

    // ── Normalized lookups ──

    /// Spot price. The only lookup whose failure aborts a request.
    pub async fn fetch_spot(&self, symbol: &str) -> PricerResult<f64> {
        let quote = self.get_quote(symbol).await.map_err(|e| match e {
            PricerError::Config(_) => e,
            other => PricerError::DataUnavailable(format!("quote for {symbol}: {other}")),
        })?;
        reconcile::spot_from_quote(symbol, &quote)
    }

    /// Risk-free rate from the economic series, bounded by `timeout`.
    /// Any failure yields `DEFAULT_RISK_FREE_RATE`.
    pub async fn fetch_risk_free_rate(&self, series: &str, timeout: Duration) -> Resolved<f64> {
        let outcome = match tokio::time::timeout(timeout, self.get_economic_series(series)).await {
            Ok(Ok(resp)) => reconcile::rate_from_series(&resp)
                .ok_or_else(|| format!("series {series} has no usable observation")),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("series {series} timed out after {}ms", timeout.as_millis())),
        };

        match outcome {
            Ok(rate) => Resolved::fetched(rate),
            Err(reason) => {
                tracing::warn!(
                    series = %series,
                    reason = %reason,
                    "risk-free rate unavailable, using default"
                );
                Resolved::fallback(
                    DEFAULT_RISK_FREE_RATE,
                    format!(
                        "risk-free rate unavailable ({reason}); using {DEFAULT_RISK_FREE_RATE}"
                    ),
                )
            }
        }
    }

    /// Continuous dividend yield; 0 when the profile is missing or unusable.
    pub async fn fetch_dividend_yield(&self, symbol: &str) -> Resolved<f64> {
        match self.get_profile(symbol).await {
            Ok(profile) => Resolved::fetched(reconcile::dividend_yield_from_profile(&profile)),
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "dividend yield unavailable, using 0");
                Resolved::fallback(0.0, format!("dividend yield unavailable ({e}); using 0"))
            }
        }
    }

    /// Nearest listed contract; absence is never an error.
    pub async fn fetch_contract(
        &self,
        symbol: &str,
        expiration: NaiveDate,
        option_type: OptionType,
        strike: f64,
    ) -> Resolved<Option<OptionContractSummary>> {
        match self.get_option_chain(symbol, expiration).await {
            Ok(chain) => {
                let matched =
                    reconcile::match_contract(&chain, symbol, expiration, option_type, strike);
                if matched.is_none() {
                    tracing::debug!(
                        symbol = %symbol,
                        %expiration,
                        "no listed contract for expiration"
                    );
                }
                Resolved::fetched(matched)
            }
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "option chain lookup failed");
                Resolved::fallback(None, format!("option chain unavailable ({e})"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock;

    fn client(base_url: &str) -> MarketDataClient {
        MarketDataClient::new(base_url, Some("test-key".into()), Duration::from_secs(5))
    }

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 17).unwrap()
    }

    #[tokio::test]
    async fn test_healthy_lookups() {
        let md = client(&mock::serve(mock::healthy_provider()).await);

        assert_eq!(md.fetch_spot("AAPL").await.unwrap(), 155.0);

        let rate = md.fetch_risk_free_rate("DGS3MO", Duration::from_secs(1)).await;
        assert!((rate.value - 0.05).abs() < 1e-12);
        assert!(rate.note.is_none());

        let dividend = md.fetch_dividend_yield("AAPL").await;
        assert_eq!(dividend, Resolved { value: 0.0, note: None });

        let contract = md.fetch_contract("AAPL", expiry(), OptionType::Call, 151.0).await;
        let contract = contract.value.unwrap();
        assert_eq!(contract.symbol, "AAPL-C150");
        assert_eq!(contract.implied_volatility, Some(0.25));
    }

    #[tokio::test]
    async fn test_unusable_spot_is_fatal() {
        let md = client(&mock::serve(mock::healthy_provider()).await);
        assert!(matches!(md.fetch_spot("ZZZZ").await, Err(PricerError::DataUnavailable(_))));
    }

    #[tokio::test]
    async fn test_secondary_failures_fall_back() {
        let md = client(&mock::serve(mock::degraded_provider()).await);

        let rate = md.fetch_risk_free_rate("DGS3MO", Duration::from_millis(200)).await;
        assert_eq!(rate.value, DEFAULT_RISK_FREE_RATE);
        assert!(rate.note.unwrap().contains("timed out"));

        let dividend = md.fetch_dividend_yield("AAPL").await;
        assert_eq!(dividend.value, 0.0);
        assert!(dividend.note.is_some());

        let contract = md.fetch_contract("AAPL", expiry(), OptionType::Call, 150.0).await;
        assert!(contract.value.is_none());
        assert!(contract.note.is_some());
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let md = MarketDataClient::new("http://127.0.0.1:9", None, Duration::from_secs(1));
        assert!(matches!(md.get_quote("AAPL").await, Err(PricerError::Config(_))));
    }
}
