use std::sync::Arc;

use alma::{AlmaBridge, PaymentDataBuilder, PaymentRepository};

/// Shared application state for the gateway server.
pub struct AppState {
    pub bridge: AlmaBridge,
    pub payments: Arc<dyn PaymentRepository>,
    /// Enriches payment-creation payloads with host order data.
    pub data_builder: Arc<dyn PaymentDataBuilder>,
    /// Base of the return and IPN URLs sent to Alma.
    pub public_base_url: String,
    /// Bearer token for /metrics.
    pub metrics_token: Option<Vec<u8>>,
    /// Serve /metrics without a token when none is configured.
    pub public_metrics: bool,
    /// Bearer token for /admin routes. Admin routes are disabled without it.
    pub admin_token: Option<Vec<u8>>,
}

/// Constant-time bearer check against an optional configured token.
pub(crate) fn bearer_matches(header: Option<&str>, token: &[u8]) -> bool {
    header
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| alma::security::constant_time_eq(t.as_bytes(), token))
        .unwrap_or(false)
}
