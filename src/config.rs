use crate::errors::{PricerError, PricerResult};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Market data credential. Absence is not fatal at startup; every pricing
    /// request fails with a config error until it is set.
    pub market_data_api_key: Option<String>,
    pub market_data_base_url: String,
    /// Economic series key used as the risk-free rate proxy (3-month T-bill).
    pub risk_free_series: String,
    pub pde_service_url: String,
    pub server_port: u16,
    pub http_timeout: Duration,
    pub rate_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> PricerResult<Self> {
        dotenvy::dotenv().ok();

        let server_port = env_var_or("SERVER_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| PricerError::Config(format!("SERVER_PORT: {e}")))?;

        let http_timeout_secs = env_var_or("HTTP_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map_err(|e| PricerError::Config(format!("HTTP_TIMEOUT_SECS: {e}")))?;

        let rate_timeout_ms = env_var_or("RATE_TIMEOUT_MS", "2500")
            .parse::<u64>()
            .map_err(|e| PricerError::Config(format!("RATE_TIMEOUT_MS: {e}")))?;

        let market_data_api_key = std::env::var("MARKET_DATA_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        if market_data_api_key.is_none() {
            tracing::warn!("MARKET_DATA_API_KEY not set; pricing requests will be rejected");
        }

        Ok(Self {
            market_data_api_key,
            market_data_base_url: env_var_or(
                "MARKET_DATA_BASE_URL",
                "https://finnhub.io/api/v1",
            ),
            risk_free_series: env_var_or("RISK_FREE_SERIES", "DGS3MO"),
            pde_service_url: env_var_or(
                "PDE_SERVICE_URL",
                &format!("http://127.0.0.1:{server_port}"),
            ),
            server_port,
            http_timeout: Duration::from_secs(http_timeout_secs),
            rate_timeout: Duration::from_millis(rate_timeout_ms),
        })
    }

    /// Returns the market data credential or the request-fatal config error.
    pub fn require_api_key(&self) -> PricerResult<&str> {
        self.market_data_api_key
            .as_deref()
            .ok_or_else(|| PricerError::Config("missing env var: MARKET_DATA_API_KEY".into()))
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
pub fn test_config(market_data_base_url: &str, pde_service_url: &str) -> AppConfig {
    AppConfig {
        market_data_api_key: Some("test-key".into()),
        market_data_base_url: market_data_base_url.to_string(),
        risk_free_series: "DGS3MO".into(),
        pde_service_url: pde_service_url.to_string(),
        server_port: 0,
        http_timeout: Duration::from_secs(5),
        rate_timeout: Duration::from_millis(1000),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_config_error() {
        let mut cfg = test_config("http://localhost", "http://localhost");
        cfg.market_data_api_key = None;
        assert!(matches!(cfg.require_api_key(), Err(PricerError::Config(_))));
    }
}
