use thiserror::Error;

use crate::config::ApiMode;

/// Rejected IPN signature. Always surfaced to the caller as a 403.
///
/// The message names the payment id only; the shared secret and the
/// presented signature never appear in it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("HMAC validation failed for payment {payment_id}")]
    SignatureMismatch { payment_id: String },
}

/// Failure talking to the Alma API. Kinds are distinguished by message only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RequestError {
    pub message: String,
    /// HTTP status, when the provider answered at all.
    pub status: Option<u16>,
}

impl RequestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

/// The Alma API client could not be built. Logged and degraded to "no client".
#[derive(Debug, Error)]
pub enum ClientConstructionError {
    #[error("no API key configured for {0} mode")]
    MissingApiKey(ApiMode),

    #[error("invalid API root '{root}': {reason}")]
    InvalidApiRoot { root: String, reason: String },

    #[error("http client build failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised while creating or reconciling a payment against Alma.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("could not fetch Alma payment {alma_id} to validate payment {local_id}: {reason}")]
    FetchFailed {
        local_id: i64,
        alma_id: String,
        reason: String,
    },

    /// The fetch succeeded but returned no record.
    #[error("Alma payment {alma_id} not found while validating payment {local_id}")]
    NotFound { local_id: i64, alma_id: String },

    /// The provider record belongs to another local payment. Never downgraded to `false`.
    #[error("attempt to validate payment {local_id} with Alma payment {alma_id}")]
    IdMismatch {
        local_id: i64,
        alma_id: String,
        found: Option<i64>,
    },

    #[error("Alma API client unavailable")]
    ClientUnavailable,

    #[error("currency {0} is not supported by Alma")]
    UnsupportedCurrency(String),

    #[error("could not create Alma payment for payment {local_id}: {reason}")]
    CreateFailed { local_id: i64, reason: String },

    /// Every attempt to store the outcome lost against a concurrent writer.
    #[error("payment {0} kept changing while it was being reconciled")]
    StoreConflict(i64),
}

impl PaymentError {
    pub fn is_id_mismatch(&self) -> bool {
        matches!(self, PaymentError::IdMismatch { .. })
    }
}

/// Invalid gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
