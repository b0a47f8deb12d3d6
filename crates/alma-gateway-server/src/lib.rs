//! Alma gateway server: receives IPN callbacks and serves payment status.
//!
//! Protocol logic lives in the core [`alma`] crate; this crate provides the
//! HTTP routes, shared state, configuration from the environment and metrics.
//!
//! # Modules
//!
//! - [`routes`]: HTTP endpoints (health, metrics, notify, status, checkout, installment plan, admin)
//! - [`state`]: Shared [`AppState`](state::AppState)
//! - [`config`]: [`ServerConfig`](config::ServerConfig) from environment variables
//! - [`error`]: JSON error responses
//! - [`metrics`]: Prometheus metrics for IPN and reconciliation

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
