//! Payment status resolution for customer returns and polling.
//!
//! Reconciles a payment at most once: after the first run the persisted
//! `is_valid` flag answers every later query.

use serde::{Deserialize, Serialize};

use crate::bridge::AlmaBridge;
use crate::constants::MAX_SAVE_ATTEMPTS;
use crate::error::PaymentError;
use crate::payment::{LocalPayment, LocalPaymentState, PaymentDetails, Validation};
use crate::reconcile;
use crate::repository::PaymentRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    New,
    Pending,
    Captured,
    Failed,
}

impl PaymentStatus {
    /// Lifecycle state this status moves the local payment to, if any.
    pub fn lifecycle_state(&self) -> Option<LocalPaymentState> {
        match self {
            PaymentStatus::New | PaymentStatus::Pending => None,
            PaymentStatus::Captured => Some(LocalPaymentState::Captured),
            PaymentStatus::Failed => Some(LocalPaymentState::Failed),
        }
    }
}

/// Map the validation flag to a status, dropping the checkout payload once settled.
pub fn settle(details: &mut PaymentDetails) -> PaymentStatus {
    match details.is_valid {
        Validation::Valid => {
            details.clear_payload();
            PaymentStatus::Captured
        }
        Validation::Invalid => {
            details.clear_payload();
            PaymentStatus::Failed
        }
        Validation::Unknown => PaymentStatus::Pending,
    }
}

/// Decide the status of `payment`, reconciling with Alma when still unknown.
///
/// `query_pid` is the Alma payment id from the customer return URL. A flag
/// stored earlier (e.g. by an IPN) settles the payment even without it. On
/// ownership mismatch the payment is left exactly as it was.
pub async fn resolve_status(
    bridge: &AlmaBridge,
    payment: &mut LocalPayment,
    query_pid: Option<&str>,
) -> Result<PaymentStatus, PaymentError> {
    if !payment.details.has_payload() && payment.details.is_valid.is_unknown() {
        return Ok(PaymentStatus::New);
    }

    let pid = query_pid.filter(|p| !p.is_empty());
    if pid.is_none() && payment.details.is_valid.is_unknown() {
        return Ok(PaymentStatus::Pending);
    }

    let mut details = payment.details.clone();
    if let Some(pid) = pid {
        details.payment_id = Some(pid.to_string());
    }

    if let Some(pid) = pid.filter(|_| details.is_valid.is_unknown() && payment.state.is_open()) {
        match reconcile::validate_payment(bridge, payment, pid).await {
            Ok(rec) => rec.apply(&mut details),
            Err(e) if e.is_id_mismatch() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    payment_id = payment.id,
                    alma_payment_id = pid,
                    error = %e,
                    "Alma payment could not be validated, marking invalid"
                );
                details.is_valid = Validation::Invalid;
            }
        }
    }

    let status = settle(&mut details);
    payment.details = details;
    if let Some(next) = status.lifecycle_state() {
        payment.advance_to(next);
    }
    Ok(status)
}

/// Resolve the status of stored payment `local_id` and persist any change.
///
/// Returns `Ok(None)` when the payment does not exist. A write that raced
/// another writer is redone on the fresh value.
pub async fn refresh_status(
    bridge: &AlmaBridge,
    repo: &dyn PaymentRepository,
    local_id: i64,
    query_pid: Option<&str>,
) -> Result<Option<PaymentStatus>, PaymentError> {
    for attempt in 1..=MAX_SAVE_ATTEMPTS {
        let Some(stored) = repo.find(local_id) else {
            return Ok(None);
        };
        let mut payment = stored.clone();
        let status = resolve_status(bridge, &mut payment, query_pid).await?;
        if payment == stored || repo.compare_and_save(&stored, payment) {
            return Ok(Some(status));
        }
        tracing::debug!(payment_id = local_id, attempt, "payment changed during status check, retrying");
    }
    Err(PaymentError::StoreConflict(local_id))
}
