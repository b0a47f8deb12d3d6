//! Facade between the host and the Alma API client.
//!
//! Holds the current [`GatewayConfig`] and a lazily built [`AlmaClient`].
//! The client is rebuilt on the next call after a mode change or an explicit
//! [`AlmaBridge::initialize`]/[`AlmaBridge::invalidate`].

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};

use crate::client::AlmaClient;
use crate::config::{ApiMode, GatewayConfig};
use crate::security::redact_key;
use crate::types::{Eligibility, Merchant};

struct CachedClient {
    mode: ApiMode,
    client: Arc<AlmaClient>,
}

struct BridgeState {
    config: GatewayConfig,
    client: Option<CachedClient>,
    /// Bumped on every re-initialization; a client built against an older
    /// generation is handed out but never cached.
    generation: u64,
}

pub struct AlmaBridge {
    state: RwLock<BridgeState>,
}

impl AlmaBridge {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            state: RwLock::new(BridgeState {
                config,
                client: None,
                generation: 0,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BridgeState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BridgeState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the configuration and drop the cached client.
    pub fn initialize(&self, config: GatewayConfig) {
        let mut state = self.write();
        tracing::info!(
            mode = %config.api_mode,
            key = %redact_key(config.active_api_key()),
            "Alma gateway re-initialized"
        );
        state.config = config;
        state.client = None;
        state.generation = state.generation.wrapping_add(1);
    }

    /// Drop the cached client; the next call builds a fresh one.
    pub fn invalidate(&self) {
        let mut state = self.write();
        state.client = None;
        state.generation = state.generation.wrapping_add(1);
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        self.read().config.clone()
    }

    pub fn api_mode(&self) -> ApiMode {
        self.read().config.api_mode
    }

    /// API key of the configured mode, used as the IPN signing secret.
    pub fn active_api_key(&self) -> String {
        self.read().config.active_api_key().to_string()
    }

    /// Client for `mode` (defaults to the configured mode).
    ///
    /// `None` when the client cannot be built; the cause is logged. Never panics.
    pub fn client(&self, mode: Option<ApiMode>) -> Option<Arc<AlmaClient>> {
        let (config, mode, generation) = {
            let state = self.read();
            let mode = mode.unwrap_or(state.config.api_mode);
            if let Some(cached) = state.client.as_ref().filter(|c| c.mode == mode) {
                return Some(Arc::clone(&cached.client));
            }
            (state.config.clone(), mode, state.generation)
        };

        let client = match AlmaClient::from_config(&config, mode) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::error!(mode = %mode, error = %e, "Error creating Alma API client");
                return None;
            }
        };

        let mut state = self.write();
        if state.generation != generation {
            return Some(client);
        }
        if let Some(cached) = state.client.as_ref().filter(|c| c.mode == mode) {
            return Some(Arc::clone(&cached.client));
        }
        state.client = Some(CachedClient {
            mode,
            client: Arc::clone(&client),
        });
        Some(client)
    }

    /// Merchant behind the configured key, or `None` if the call fails.
    pub async fn merchant_info(&self) -> Option<Merchant> {
        let client = self.client(None)?;
        match client.merchant_me().await {
            Ok(merchant) => Some(merchant),
            Err(e) => {
                tracing::warn!(error = %e, "Could not fetch Alma merchant info");
                None
            }
        }
    }

    /// Eligibility of a cart for each of `installments_counts`.
    ///
    /// `base` is the eligibility payload; the counts are merged into its
    /// `payment` object. Any failure yields an empty list.
    pub async fn eligibilities(&self, base: Value, installments_counts: &[u8]) -> Vec<Eligibility> {
        let Some(client) = self.client(None) else {
            return Vec::new();
        };

        let payload = with_installments_counts(base, installments_counts);
        match client.eligibility(&payload).await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "Alma eligibility request failed");
                Vec::new()
            }
        }
    }
}

fn with_installments_counts(base: Value, installments_counts: &[u8]) -> Value {
    let mut root = match base {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let payment = root
        .entry("payment")
        .or_insert_with(|| Value::Object(Map::new()));
    if !payment.is_object() {
        *payment = Value::Object(Map::new());
    }
    if let Value::Object(payment) = payment {
        payment.insert(
            "installments_count".into(),
            Value::from(installments_counts.to_vec()),
        );
    }
    Value::Object(root)
}
