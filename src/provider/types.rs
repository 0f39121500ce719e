use crate::models::OptionType;
use serde::{Deserialize, Deserializer, Serialize};

// Provider payloads are tolerant: every field optional, numbers accepted as
// JSON numbers or numeric strings, alternate spellings aliased.

fn flexible_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

// ── Quote ──

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteResponse {
    #[serde(default, alias = "c", alias = "currentPrice", deserialize_with = "flexible_f64")]
    pub current_price: Option<f64>,
    #[serde(default, alias = "pc", alias = "previousClose", deserialize_with = "flexible_f64")]
    pub previous_close: Option<f64>,
}

// ── Issuer profile ──

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileResponse {
    #[serde(default, alias = "dividendYield", deserialize_with = "flexible_f64")]
    pub dividend_yield: Option<f64>,
}

// ── Economic series ──

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    pub date: Option<String>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EconomicSeriesResponse {
    #[serde(default, alias = "observations")]
    pub data: Option<Vec<Observation>>,
}

// ── Option chain ──

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawContract {
    #[serde(default, alias = "contractName", alias = "contractSymbol", alias = "symbol")]
    pub contract_name: Option<String>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub strike: Option<f64>,
    /// Per-contract tag, only present in combined lists.
    #[serde(default, alias = "type", alias = "optionType")]
    pub option_type: Option<String>,
    #[serde(default, alias = "expirationDate")]
    pub expiration_date: Option<String>,
    #[serde(default, alias = "impliedVolatility", alias = "iv", deserialize_with = "flexible_f64")]
    pub implied_volatility: Option<f64>,
    #[serde(default, alias = "lastPrice", deserialize_with = "flexible_f64")]
    pub last_price: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub bid: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub ask: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub delta: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub gamma: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub theta: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub vega: Option<f64>,
}

impl RawContract {
    /// Tag check for combined lists. Accepts "call"/"put" and "C"/"P" in any case.
    pub fn is_type(&self, option_type: OptionType) -> bool {
        let Some(tag) = self.option_type.as_deref() else {
            return false;
        };
        let tag = tag.trim().to_ascii_lowercase();
        match option_type {
            OptionType::Call => tag == "call" || tag == "c",
            OptionType::Put => tag == "put" || tag == "p",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitContracts {
    #[serde(default, alias = "CALL", alias = "call")]
    pub calls: Option<Vec<RawContract>>,
    #[serde(default, alias = "PUT", alias = "put")]
    pub puts: Option<Vec<RawContract>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpirationSlice {
    #[serde(default, alias = "expirationDate", alias = "expiration")]
    pub expiration_date: Option<String>,
    /// Pre-split shape nested under `options`.
    #[serde(default)]
    pub options: Option<SplitContracts>,
    /// Pre-split shape at slice level.
    #[serde(default)]
    pub calls: Option<Vec<RawContract>>,
    #[serde(default)]
    pub puts: Option<Vec<RawContract>>,
    /// Combined shape, each contract tagged with its type.
    #[serde(default, alias = "optionContracts")]
    pub contracts: Option<Vec<RawContract>>,
}

impl ExpirationSlice {
    /// Contracts of the requested type, whichever shape the provider used.
    pub fn contracts_for(&self, option_type: OptionType) -> Vec<&RawContract> {
        let nested = self.options.as_ref();
        if let Some(found) = nested.and_then(|o| pick(option_type, &o.calls, &o.puts)) {
            return found;
        }
        if let Some(found) = pick(option_type, &self.calls, &self.puts) {
            return found;
        }
        self.contracts
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|c| c.is_type(option_type))
            .collect()
    }
}

/// The non-empty pre-split list for `option_type`, if any.
fn pick<'a>(
    option_type: OptionType,
    calls: &'a Option<Vec<RawContract>>,
    puts: &'a Option<Vec<RawContract>>,
) -> Option<Vec<&'a RawContract>> {
    let list = match option_type {
        OptionType::Call => calls,
        OptionType::Put => puts,
    };
    list.as_ref().filter(|l| !l.is_empty()).map(|l| l.iter().collect())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionChainResponse {
    #[serde(default, alias = "optionChain", alias = "expirations")]
    pub data: Option<Vec<ExpirationSlice>>,
}
