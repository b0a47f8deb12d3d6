use std::str::FromStr;

use alma::{ApiMode, ConfigError, GatewayConfig, PaymentPageMode};

/// Server settings, read once at startup.
pub struct ServerConfig {
    pub gateway: GatewayConfig,
    pub port: u16,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
    pub admin_token: Option<Vec<u8>>,
    /// Base of the return and IPN URLs handed to Alma.
    pub public_base_url: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_mode = match get("ALMA_API_MODE") {
            Some(v) => ApiMode::from_str(&v)?,
            None => ApiMode::default(),
        };

        let mut gateway = GatewayConfig::new(
            api_mode,
            get("ALMA_LIVE_API_KEY").unwrap_or_default(),
            get("ALMA_TEST_API_KEY").unwrap_or_default(),
        );
        if let Some(merchant_id) = get("ALMA_MERCHANT_ID") {
            gateway = gateway.with_merchant_id(merchant_id);
        }
        if let Some(v) = get("ALMA_INSTALLMENTS_COUNT") {
            let count = v.parse().map_err(|_| ConfigError::Invalid {
                key: "ALMA_INSTALLMENTS_COUNT",
                value: v.clone(),
            })?;
            gateway = gateway.with_installments_count(count);
        }
        if let Some(v) = get("ALMA_PAYMENT_PAGE_MODE") {
            gateway.payment_page_mode = PaymentPageMode::from_str(&v)?;
        }
        if let Some(root) = get("ALMA_API_ROOT") {
            gateway = gateway.with_api_root(root);
        }
        if let Some(v) = get("ALMA_TIMEOUT_SECS") {
            gateway.timeout_secs = Some(v.parse().map_err(|_| ConfigError::Invalid {
                key: "ALMA_TIMEOUT_SECS",
                value: v.clone(),
            })?);
        }
        gateway.validate()?;

        let port = get("PORT").and_then(|p| p.parse().ok()).unwrap_or(4030);
        let rate_limit_rpm = get("RATE_LIMIT_RPM")
            .and_then(|r| r.parse().ok())
            .unwrap_or(120);

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let public_metrics = get("ALMA_PUBLIC_METRICS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let public_base_url =
            get("PUBLIC_BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}"));

        Ok(Self {
            gateway,
            port,
            rate_limit_rpm,
            allowed_origins,
            metrics_token: get("METRICS_TOKEN").map(String::into_bytes),
            public_metrics,
            admin_token: get("ADMIN_TOKEN").map(String::into_bytes),
            public_base_url,
        })
    }
}
