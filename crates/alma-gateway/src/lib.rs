//! Alma installment payments for e-commerce checkouts.
//!
//! Creates Alma payments, verifies IPN callbacks and reconciles the local
//! payment with the provider's record before trusting it.
//!
//! # Flow
//!
//! - **Checkout** ([`initiate_payment`]) creates the Alma payment and stores
//!   the redirect payload on the local payment
//! - **IPN** ([`handle_notification`]) checks the `X-Alma-Signature` HMAC,
//!   then reconciles the payment against a fresh provider fetch
//! - **Return / polling** ([`resolve_status`]) turns the persisted validation
//!   flag into `new`, `pending`, `captured` or `failed`, reconciling at most once
//!
//! # Quick example
//!
//! ```no_run
//! use alma::{handle_notification, AlmaBridge, ApiMode, GatewayConfig};
//! use alma::{InMemoryPaymentRepository, NotificationRequest};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bridge = AlmaBridge::new(GatewayConfig::new(ApiMode::Test, "", "sk_test_..."));
//! let payments = InMemoryPaymentRepository::new();
//!
//! let request = NotificationRequest::new(Some("payment_11uP...".into()), Some("3f9a...".into()));
//! match handle_notification(&bridge, &payments, 42, request).await {
//!     Ok(ack) => println!("validated: {:?}", ack.state),
//!     Err(e) => println!("{}: {}", e.status_code(), e.public_message()),
//! }
//! # }
//! ```

// Core types
pub mod config;
pub mod constants;
pub mod error;
pub mod payment;
pub mod types;

// Security
pub mod hmac;
pub mod security;

// Provider access
pub mod bridge;
pub mod client;

// Payment protocol
pub mod checkout;
pub mod eligibility;
pub mod notify;
pub mod reconcile;
pub mod repository;
pub mod status;

pub use bridge::AlmaBridge;
pub use checkout::{initiate_payment, BasePaymentData, CheckoutPayload, CheckoutUrls, PaymentDataBuilder};
pub use client::AlmaClient;
pub use config::{ApiMode, GatewayConfig, PaymentPageMode};
pub use eligibility::{installment_plan, EligibilityQuery, InstallmentPlanView};
pub use error::{ClientConstructionError, ConfigError, PaymentError, RequestError, SecurityError};
pub use notify::{handle_notification, NotificationAck, NotificationRequest, NotifyError};
pub use payment::{LocalPayment, LocalPaymentState, PaymentDetails, Validation};
pub use reconcile::{validate_payment, Reconciliation, TrustFailure};
pub use repository::{InMemoryPaymentRepository, PaymentRepository};
pub use status::{refresh_status, resolve_status, PaymentStatus};
pub use types::{AlmaOrder, AlmaPayment, Eligibility, Installment, Merchant};
