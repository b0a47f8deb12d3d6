//! IPN callback handling.
//!
//! Alma calls the IPN URL with `?pid=<alma payment id>` and an
//! `X-Alma-Signature` header. Nothing is read or written before the
//! signature checks out.

use serde::Serialize;
use thiserror::Error;

use crate::bridge::AlmaBridge;
use crate::constants::MAX_SAVE_ATTEMPTS;
use crate::error::{PaymentError, SecurityError};
use crate::hmac;
use crate::reconcile;
use crate::repository::PaymentRepository;

/// Raw inputs of an IPN callback.
#[derive(Debug, Clone, Default)]
pub struct NotificationRequest {
    pub pid: Option<String>,
    pub signature: Option<String>,
}

impl NotificationRequest {
    pub fn new(pid: Option<String>, signature: Option<String>) -> Self {
        Self { pid, signature }
    }
}

/// Body of a successful IPN response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAck {
    pub success: bool,
    /// Validation flag after processing; `null` when still unknown.
    pub state: Option<bool>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("No payment ID provided in IPN callback")]
    MissingPaymentId,

    #[error("No signature provided in IPN callback")]
    MissingSignature,

    #[error(transparent)]
    Signature(#[from] SecurityError),

    #[error("payment {0} not found")]
    PaymentNotFound(i64),

    #[error(transparent)]
    Validation(#[from] PaymentError),
}

impl NotifyError {
    pub fn status_code(&self) -> u16 {
        match self {
            NotifyError::MissingPaymentId => 500,
            NotifyError::MissingSignature => 403,
            NotifyError::Signature(_) => 403,
            NotifyError::PaymentNotFound(_) => 404,
            NotifyError::Validation(_) => 500,
        }
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        match self {
            NotifyError::Validation(_) => "Payment validation failed".to_string(),
            other => other.to_string(),
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            NotifyError::MissingPaymentId => "missing_pid",
            NotifyError::MissingSignature => "missing_signature",
            NotifyError::Signature(_) => "bad_signature",
            NotifyError::PaymentNotFound(_) => "not_found",
            NotifyError::Validation(_) => "validation_error",
        }
    }
}

/// Verify and apply an IPN callback for local payment `local_id`.
pub async fn handle_notification(
    bridge: &AlmaBridge,
    repo: &dyn PaymentRepository,
    local_id: i64,
    request: NotificationRequest,
) -> Result<NotificationAck, NotifyError> {
    let pid = request
        .pid
        .filter(|p| !p.is_empty())
        .ok_or(NotifyError::MissingPaymentId)?;
    let signature = request
        .signature
        .filter(|s| !s.is_empty())
        .ok_or(NotifyError::MissingSignature)?;

    if let Err(e) = hmac::verify(&pid, &bridge.active_api_key(), &signature) {
        tracing::warn!(payment_id = local_id, alma_payment_id = %pid, "IPN signature rejected");
        return Err(e.into());
    }

    for attempt in 1..=MAX_SAVE_ATTEMPTS {
        let stored = repo
            .find(local_id)
            .ok_or(NotifyError::PaymentNotFound(local_id))?;

        let mut details = stored.details.clone();
        details.payment_id = Some(pid.clone());

        if stored.state.is_open() {
            match reconcile::validate_payment(bridge, &stored, &pid).await {
                Ok(rec) => rec.apply(&mut details),
                Err(e) => {
                    if e.is_id_mismatch() {
                        tracing::error!(
                            payment_id = local_id,
                            alma_payment_id = %pid,
                            error = %e,
                            "IPN for a payment owned by another order, left for manual review"
                        );
                    }
                    return Err(e.into());
                }
            }
        }

        let state = details.is_valid.as_flag();
        let mut payment = stored.clone();
        payment.details = details;
        if repo.compare_and_save(&stored, payment) {
            tracing::info!(payment_id = local_id, alma_payment_id = %pid, state = ?state, "IPN processed");
            return Ok(NotificationAck {
                success: true,
                state,
            });
        }
        tracing::debug!(payment_id = local_id, attempt, "payment changed during IPN, retrying");
    }

    Err(PaymentError::StoreConflict(local_id).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiMode, GatewayConfig};
    use crate::payment::{LocalPayment, LocalPaymentState, Validation};
    use crate::repository::InMemoryPaymentRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEY: &str = "sk_test_T3st";

    fn bridge() -> AlmaBridge {
        AlmaBridge::new(GatewayConfig::new(ApiMode::Test, "", KEY).with_api_root("http://127.0.0.1:1"))
    }

    fn signed(pid: &str) -> NotificationRequest {
        NotificationRequest::new(
            Some(pid.to_string()),
            Some(hmac::compute_hmac(KEY.as_bytes(), pid.as_bytes())),
        )
    }

    #[tokio::test]
    async fn missing_inputs_map_to_codes() {
        let repo = InMemoryPaymentRepository::new();
        let err = handle_notification(&bridge(), &repo, 1, NotificationRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::MissingPaymentId));
        assert_eq!(err.status_code(), 500);

        let req = NotificationRequest::new(Some("payment_x".into()), None);
        let err = handle_notification(&bridge(), &repo, 1, req).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.public_message(), "No signature provided in IPN callback");
    }

    #[tokio::test]
    async fn forged_signature_is_rejected_before_lookup() {
        let repo = InMemoryPaymentRepository::new();
        let payment = LocalPayment::new(1, 100, "EUR");
        repo.save(payment.clone());

        let req = NotificationRequest::new(Some("payment_x".into()), Some("00".repeat(32)));
        let err = handle_notification(&bridge(), &repo, 1, req).await.unwrap_err();
        assert!(matches!(err, NotifyError::Signature(_)));
        assert_eq!(err.status_code(), 403);
        assert_eq!(repo.find(1), Some(payment));
    }

    #[tokio::test]
    async fn unknown_payment_is_404() {
        let repo = InMemoryPaymentRepository::new();
        let err = handle_notification(&bridge(), &repo, 9, signed("payment_x"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn settled_payment_only_records_pid() {
        let repo = InMemoryPaymentRepository::new();
        let mut payment = LocalPayment::new(1, 100, "EUR");
        payment.state = LocalPaymentState::Captured;
        payment.details.is_valid = Validation::Valid;
        repo.save(payment);

        let ack = handle_notification(&bridge(), &repo, 1, signed("payment_x"))
            .await
            .unwrap();
        assert_eq!(ack, NotificationAck { success: true, state: Some(true) });
        assert_eq!(
            repo.find(1).unwrap().details.payment_id.as_deref(),
            Some("payment_x")
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_500_and_not_persisted() {
        let repo = InMemoryPaymentRepository::new();
        let payment = LocalPayment::new(1, 100, "EUR");
        repo.save(payment.clone());

        let err = handle_notification(&bridge(), &repo, 1, signed("payment_x"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "Payment validation failed");
        assert_eq!(repo.find(1), Some(payment));
    }

    /// Lets a competing writer change the payment right before each of the
    /// first `interferences` compare-and-save calls.
    struct ContendedRepository {
        inner: InMemoryPaymentRepository,
        interferences: AtomicUsize,
    }

    impl PaymentRepository for ContendedRepository {
        fn find(&self, id: i64) -> Option<LocalPayment> {
            self.inner.find(id)
        }

        fn save(&self, payment: LocalPayment) {
            self.inner.save(payment)
        }

        fn compare_and_save(&self, expected: &LocalPayment, payment: LocalPayment) -> bool {
            let left = self.interferences.load(Ordering::SeqCst);
            if left > 0 {
                self.interferences.store(left - 1, Ordering::SeqCst);
                let mut competing = expected.clone();
                competing.details.payload = None;
                competing
                    .details
                    .extra
                    .insert("touched".into(), serde_json::json!(left));
                self.inner.save(competing);
            }
            self.inner.compare_and_save(expected, payment)
        }
    }

    fn settled_with_payload() -> LocalPayment {
        let mut payment = LocalPayment::new(1, 100, "EUR");
        payment.state = LocalPaymentState::Captured;
        payment.details.is_valid = Validation::Valid;
        payment.details.payload = Some(serde_json::json!({"id": "payment_x"}));
        payment
    }

    #[tokio::test]
    async fn concurrent_write_is_not_overwritten() {
        let repo = ContendedRepository {
            inner: InMemoryPaymentRepository::new(),
            interferences: AtomicUsize::new(1),
        };
        repo.save(settled_with_payload());

        let ack = handle_notification(&bridge(), &repo, 1, signed("payment_x"))
            .await
            .unwrap();
        assert_eq!(ack.state, Some(true));

        let stored = repo.find(1).unwrap();
        assert_eq!(stored.details.payment_id.as_deref(), Some("payment_x"));
        assert!(!stored.details.has_payload());
        assert!(stored.details.extra.contains_key("touched"));
    }

    #[tokio::test]
    async fn endless_contention_gives_up() {
        let repo = ContendedRepository {
            inner: InMemoryPaymentRepository::new(),
            interferences: AtomicUsize::new(usize::MAX),
        };
        repo.save(settled_with_payload());

        let err = handle_notification(&bridge(), &repo, 1, signed("payment_x"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Validation(PaymentError::StoreConflict(1))));
        assert_eq!(err.status_code(), 500);
        assert!(repo.find(1).unwrap().details.payment_id.is_none());
    }
}
