use crate::config::AppConfig;
use crate::models::pde::PdeClient;
use crate::provider::client::MarketDataClient;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ── Request lifecycle ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    ResolvingInputs,
    Pricing,
    Merging,
    Complete,
}

impl std::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResolvingInputs => write!(f, "resolving_inputs"),
            Self::Pricing => write!(f, "pricing"),
            Self::Merging => write!(f, "merging"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

// ── Performance Counters (lock-free) ──

#[derive(Debug, Default)]
pub struct PerfCounters {
    pub requests: AtomicU64,
    pub requests_failed: AtomicU64,
    pub model_runs: AtomicU64,
    pub models_degraded: AtomicU64,
    pub inputs_degraded: AtomicU64,
    pub pde_solves: AtomicU64,
}

impl PerfCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            model_runs: self.model_runs.load(Ordering::Relaxed),
            models_degraded: self.models_degraded.load(Ordering::Relaxed),
            inputs_degraded: self.inputs_degraded.load(Ordering::Relaxed),
            pde_solves: self.pde_solves.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CountersSnapshot {
    pub requests: u64,
    pub requests_failed: u64,
    pub model_runs: u64,
    pub models_degraded: u64,
    pub inputs_degraded: u64,
    pub pde_solves: u64,
}

// ── Shared Application State ──

/// Shared across handlers behind an `Arc`. Nothing here is mutated except
/// the counters, so no locks.
pub struct AppState {
    pub config: AppConfig,
    pub market: MarketDataClient,
    pub pde: PdeClient,
    pub counters: PerfCounters,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        let market = MarketDataClient::from_config(&config);
        let pde = PdeClient::new(&config.pde_service_url, config.http_timeout);
        Arc::new(Self {
            config,
            market,
            pde,
            counters: PerfCounters::default(),
            started_at: chrono::Utc::now(),
        })
    }
}
