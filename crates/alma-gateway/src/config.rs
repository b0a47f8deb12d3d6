use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ALLOWED_INSTALLMENTS_COUNTS, DEFAULT_INSTALLMENTS_COUNT, DEFAULT_TIMEOUT, LIVE_API_ROOT,
    TEST_API_ROOT,
};
use crate::error::ConfigError;
use crate::security::redact_key;

/// Alma operating mode. Each mode has its own API key and API root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    #[default]
    Test,
    Live,
}

impl ApiMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMode::Test => "test",
            ApiMode::Live => "live",
        }
    }
}

impl fmt::Display for ApiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Ok(ApiMode::Test),
            "live" => Ok(ApiMode::Live),
            other => Err(ConfigError::Invalid {
                key: "api_mode",
                value: other.to_string(),
            }),
        }
    }
}

/// How the Alma payment page is presented to the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentPageMode {
    #[default]
    #[serde(rename = "in_page")]
    InPage,
    #[serde(rename = "redirect")]
    Redirect,
}

impl PaymentPageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPageMode::InPage => "in_page",
            PaymentPageMode::Redirect => "redirect",
        }
    }
}

impl FromStr for PaymentPageMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "in_page" | "payment_page_mode.in_page" => Ok(PaymentPageMode::InPage),
            "redirect" | "payment_page_mode.redirect" => Ok(PaymentPageMode::Redirect),
            other => Err(ConfigError::Invalid {
                key: "payment_page_mode",
                value: other.to_string(),
            }),
        }
    }
}

fn default_installments_count() -> u8 {
    DEFAULT_INSTALLMENTS_COUNT
}

/// Per-gateway configuration, as stored by the host's configuration store.
///
/// Immutable once built; credential changes go through
/// [`AlmaBridge::initialize`](crate::bridge::AlmaBridge::initialize) with a new value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub api_mode: ApiMode,
    #[serde(default)]
    pub live_api_key: String,
    #[serde(default)]
    pub test_api_key: String,
    #[serde(default)]
    pub merchant_id: String,
    #[serde(default = "default_installments_count")]
    pub installments_count: u8,
    #[serde(default)]
    pub payment_page_mode: PaymentPageMode,
    /// Overrides the mode's API root (sandboxes, local mocks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_root: Option<String>,
    /// Outbound request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl GatewayConfig {
    pub fn new(
        api_mode: ApiMode,
        live_api_key: impl Into<String>,
        test_api_key: impl Into<String>,
    ) -> Self {
        Self {
            api_mode,
            live_api_key: live_api_key.into(),
            test_api_key: test_api_key.into(),
            merchant_id: String::new(),
            installments_count: DEFAULT_INSTALLMENTS_COUNT,
            payment_page_mode: PaymentPageMode::default(),
            api_root: None,
            timeout_secs: None,
        }
    }

    pub fn with_api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = Some(api_root.into());
        self
    }

    pub fn with_merchant_id(mut self, merchant_id: impl Into<String>) -> Self {
        self.merchant_id = merchant_id.into();
        self
    }

    pub fn with_installments_count(mut self, count: u8) -> Self {
        self.installments_count = count;
        self
    }

    /// The key for the configured mode. Never mixes test and live credentials.
    pub fn active_api_key(&self) -> &str {
        self.api_key_for(self.api_mode)
    }

    pub fn api_key_for(&self, mode: ApiMode) -> &str {
        match mode {
            ApiMode::Live => &self.live_api_key,
            ApiMode::Test => &self.test_api_key,
        }
    }

    pub fn api_root(&self) -> &str {
        self.api_root_for(self.api_mode)
    }

    pub fn api_root_for(&self, mode: ApiMode) -> &str {
        if let Some(root) = self.api_root.as_deref().filter(|r| !r.is_empty()) {
            return root;
        }
        match mode {
            ApiMode::Live => LIVE_API_ROOT,
            ApiMode::Test => TEST_API_ROOT,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Check the settings the gateway cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.active_api_key().is_empty() {
            return Err(ConfigError::Missing(match self.api_mode {
                ApiMode::Live => "live_api_key",
                ApiMode::Test => "test_api_key",
            }));
        }
        if !ALLOWED_INSTALLMENTS_COUNTS.contains(&self.installments_count) {
            return Err(ConfigError::Invalid {
                key: "installments_count",
                value: self.installments_count.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_mode", &self.api_mode)
            .field("live_api_key", &redact_key(&self.live_api_key))
            .field("test_api_key", &redact_key(&self.test_api_key))
            .field("merchant_id", &self.merchant_id)
            .field("installments_count", &self.installments_count)
            .field("payment_page_mode", &self.payment_page_mode)
            .field("api_root", &self.api_root)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
