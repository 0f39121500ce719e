use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

/// A single rejected request field.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Domain-specific error types for the pricing service.
/// Only request-fatal failures travel through this type. Degraded inputs
/// (rate, yield, chain) and failed models are absorbed where they happen.
#[derive(Debug, thiserror::Error)]
pub enum PricerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("validation failed: {} field(s) rejected", .0.len())]
    Validation(Vec<FieldError>),

    #[error("invalid expiration: {0}")]
    InvalidExpiration(String),

    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("market data API error: {status} {body}")]
    ProviderApi { status: u16, body: String },

    #[error("PDE service error: {status} {body}")]
    PdeService { status: u16, body: String },

    #[error("model computation error: {0}")]
    Model(String),
}

impl From<reqwest::Error> for PricerError {
    fn from(e: reqwest::Error) -> Self {
        PricerError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for PricerError {
    fn from(e: serde_json::Error) -> Self {
        PricerError::Parse(e.to_string())
    }
}

pub type PricerResult<T> = Result<T, PricerError>;

impl PricerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidExpiration(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::DataUnavailable(_)
            | Self::Network(_)
            | Self::Parse(_)
            | Self::ProviderApi { .. }
            | Self::PdeService { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Validation failures carry field-level detail; every other failure
/// renders as a single message.
impl IntoResponse for PricerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Validation(fields) => serde_json::json!({
                "error": "validation_failed",
                "fields": fields,
            }),
            Self::InvalidExpiration(msg) => serde_json::json!({
                "error": "validation_failed",
                "fields": [FieldError::new("expiration", msg.clone())],
            }),
            other => serde_json::json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
