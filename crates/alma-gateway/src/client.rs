//! HTTP client for the Alma REST API.
//!
//! Only the calls the gateway needs: fetch a payment, create a payment,
//! merchant info and eligibility. Every failure is a [`RequestError`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::{ApiMode, GatewayConfig};
use crate::error::{ClientConstructionError, RequestError};
use crate::types::{AlmaPayment, Eligibility, Merchant, OneOrMany};

/// Longest provider error body echoed into a [`RequestError`].
const MAX_ERROR_BODY: usize = 256;

/// A configured connection to the Alma API for one mode and key.
pub struct AlmaClient {
    http: reqwest::Client,
    api_root: Url,
    api_key: String,
    mode: ApiMode,
}

impl AlmaClient {
    pub fn new(
        api_key: &str,
        api_root: &str,
        mode: ApiMode,
        timeout: Duration,
    ) -> Result<Self, ClientConstructionError> {
        if api_key.trim().is_empty() {
            return Err(ClientConstructionError::MissingApiKey(mode));
        }

        let api_root = Url::parse(api_root).map_err(|e| ClientConstructionError::InvalidApiRoot {
            root: api_root.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(api_root.scheme(), "http" | "https") || api_root.cannot_be_a_base() {
            return Err(ClientConstructionError::InvalidApiRoot {
                root: api_root.to_string(),
                reason: "expected an http(s) base URL".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("alma-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_root,
            api_key: api_key.to_string(),
            mode,
        })
    }

    /// Build a client for `mode` from the gateway configuration.
    pub fn from_config(
        config: &GatewayConfig,
        mode: ApiMode,
    ) -> Result<Self, ClientConstructionError> {
        Self::new(
            config.api_key_for(mode),
            config.api_root_for(mode),
            mode,
            config.timeout(),
        )
    }

    pub fn mode(&self) -> ApiMode {
        self.mode
    }

    pub fn api_root(&self) -> &str {
        self.api_root.as_str()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RequestError> {
        let mut url = self.api_root.clone();
        url.path_segments_mut()
            .map_err(|_| RequestError::new("API root cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("Authorization", format!("Alma-Auth {}", self.api_key))
            .header("Accept", "application/json")
    }

    /// `GET /v1/payments/{id}`.
    ///
    /// `Ok(None)` when the call went through but no record came back
    /// (404 or an empty/`null` body).
    pub async fn fetch_payment(&self, payment_id: &str) -> Result<Option<AlmaPayment>, RequestError> {
        let url = self.endpoint(&["v1", "payments", payment_id])?;
        let resp = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|e| RequestError::new(format!("request failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| RequestError::new(format!("failed to read response: {e}")))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice::<Option<AlmaPayment>>(&body)
            .map_err(|e| RequestError::new(format!("failed to parse payment: {e}")))
    }

    /// `POST /v1/payments`.
    pub async fn create_payment(&self, payload: &Value) -> Result<AlmaPayment, RequestError> {
        let url = self.endpoint(&["v1", "payments"])?;
        let resp = self
            .authorized(self.http.post(url))
            .json(payload)
            .send()
            .await
            .map_err(|e| RequestError::new(format!("request failed: {e}")))?;
        parse_json(resp).await
    }

    /// `GET /v1/me`.
    pub async fn merchant_me(&self) -> Result<Merchant, RequestError> {
        let url = self.endpoint(&["v1", "me"])?;
        let resp = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|e| RequestError::new(format!("request failed: {e}")))?;
        parse_json(resp).await
    }

    /// `POST /v2/payments/eligibility`.
    pub async fn eligibility(&self, payload: &Value) -> Result<Vec<Eligibility>, RequestError> {
        let url = self.endpoint(&["v2", "payments", "eligibility"])?;
        let resp = self
            .authorized(self.http.post(url))
            .json(payload)
            .send()
            .await
            .map_err(|e| RequestError::new(format!("request failed: {e}")))?;
        let parsed: OneOrMany<Eligibility> = parse_json(resp).await?;
        Ok(parsed.into())
    }
}

async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, RequestError> {
    if !resp.status().is_success() {
        return Err(error_from_response(resp).await);
    }
    resp.json::<T>()
        .await
        .map_err(|e| RequestError::new(format!("failed to parse response: {e}")))
}

async fn error_from_response(resp: reqwest::Response) -> RequestError {
    let status = resp.status();
    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    RequestError::with_status(
        status.as_u16(),
        format!("Alma API returned {status}: {}", body.trim()),
    )
}
