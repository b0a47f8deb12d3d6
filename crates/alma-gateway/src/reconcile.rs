//! Cross-checks applied to an Alma payment record before it is trusted.
//!
//! The record is always fetched fresh from the provider. Ownership is checked
//! first and is fatal; the remaining checks are a plain conjunction whose
//! failures are reported individually for the logs.

use std::fmt;

use serde_json::{Map, Value};

use crate::bridge::AlmaBridge;
use crate::constants::{INSTALLMENT_STATE_PAID, STATE_IN_PROGRESS, STATE_PAID};
use crate::error::PaymentError;
use crate::payment::{LocalPayment, PaymentDetails, Validation};
use crate::types::AlmaPayment;

/// A trust check the provider record did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustFailure {
    AmountMismatch { expected: i64, actual: i64 },
    Expired { expired_at: i64 },
    UnexpectedState(String),
    FirstInstallmentUnpaid(Option<String>),
}

impl fmt::Display for TrustFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustFailure::AmountMismatch { expected, actual } => {
                write!(f, "purchase amount {actual} does not match {expected}")
            }
            TrustFailure::Expired { expired_at } => write!(f, "payment expired at {expired_at}"),
            TrustFailure::UnexpectedState(state) => write!(f, "unexpected payment state '{state}'"),
            TrustFailure::FirstInstallmentUnpaid(Some(state)) => {
                write!(f, "first installment is '{state}', not paid")
            }
            TrustFailure::FirstInstallmentUnpaid(None) => f.write_str("payment plan is empty"),
        }
    }
}

/// Result of reconciling a local payment with its Alma record.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub valid: bool,
    pub failures: Vec<TrustFailure>,
    /// Snapshot of the provider record, orders flattened.
    pub payment_data: Value,
}

impl Reconciliation {
    pub fn validation(&self) -> Validation {
        Validation::from_flag(Some(self.valid))
    }

    /// Record the outcome on the payment details. Flag and snapshot go together.
    pub fn apply(self, details: &mut PaymentDetails) {
        details.is_valid = self.validation();
        details.payment_data = Some(self.payment_data);
    }
}

/// The record must have been created for this local payment.
pub fn check_ownership(local: &LocalPayment, record: &AlmaPayment) -> Result<(), PaymentError> {
    let found = record.custom_payment_id();
    if found == Some(local.id) {
        return Ok(());
    }
    Err(PaymentError::IdMismatch {
        local_id: local.id,
        alma_id: record.id.clone(),
        found,
    })
}

/// Run the trust checks that follow ownership. Empty means trusted.
pub fn trust_failures(local: &LocalPayment, record: &AlmaPayment) -> Vec<TrustFailure> {
    let mut failures = Vec::new();

    if record.purchase_amount != local.amount {
        failures.push(TrustFailure::AmountMismatch {
            expected: local.amount,
            actual: record.purchase_amount,
        });
    }

    if let Some(expired_at) = record.expired_at {
        failures.push(TrustFailure::Expired { expired_at });
    }

    if record.state != STATE_IN_PROGRESS && record.state != STATE_PAID {
        failures.push(TrustFailure::UnexpectedState(record.state.clone()));
    }

    match record.first_installment() {
        Some(first) if first.state == INSTALLMENT_STATE_PAID => {}
        Some(first) => failures.push(TrustFailure::FirstInstallmentUnpaid(Some(first.state.clone()))),
        None => failures.push(TrustFailure::FirstInstallmentUnpaid(None)),
    }

    failures
}

/// Check a fetched record against the local payment. No I/O.
pub fn evaluate(local: &LocalPayment, record: &AlmaPayment) -> Result<Reconciliation, PaymentError> {
    check_ownership(local, record)?;
    let failures = trust_failures(local, record);
    Ok(Reconciliation {
        valid: failures.is_empty(),
        failures,
        payment_data: snapshot(record),
    })
}

/// Orders as plain key/value maps.
pub fn flatten_orders(record: &AlmaPayment) -> Vec<Value> {
    record
        .orders
        .iter()
        .map(|order| Value::Object(order.to_flat_map()))
        .collect()
}

/// The record as persisted under `payment_data`.
pub fn snapshot(record: &AlmaPayment) -> Value {
    let mut map: Map<String, Value> = record.extra.clone();
    map.insert("id".into(), Value::String(record.id.clone()));
    map.insert("state".into(), Value::String(record.state.clone()));
    map.insert("purchase_amount".into(), Value::from(record.purchase_amount));
    map.insert(
        "expired_at".into(),
        record.expired_at.map(Value::from).unwrap_or(Value::Null),
    );
    map.insert(
        "custom_data".into(),
        record
            .custom_data
            .clone()
            .map(Value::Object)
            .unwrap_or(Value::Null),
    );
    map.insert(
        "payment_plan".into(),
        Value::Array(
            record
                .payment_plan
                .iter()
                .map(|installment| {
                    let mut m = installment.extra.clone();
                    m.insert("state".into(), Value::String(installment.state.clone()));
                    m.insert("purchase_amount".into(), Value::from(installment.purchase_amount));
                    if let Some(due) = installment.due_date {
                        m.insert("due_date".into(), Value::from(due));
                    }
                    Value::Object(m)
                })
                .collect(),
        ),
    );
    map.insert("orders".into(), Value::Array(flatten_orders(record)));
    if let Some(url) = &record.url {
        map.insert("url".into(), Value::String(url.clone()));
    }
    Value::Object(map)
}

/// Fetch `alma_payment_id` and check it against `local`.
///
/// Never turns a fetch failure into a silent `false`: the caller decides.
pub async fn validate_payment(
    bridge: &AlmaBridge,
    local: &LocalPayment,
    alma_payment_id: &str,
) -> Result<Reconciliation, PaymentError> {
    let fetch_failed = |reason: String| PaymentError::FetchFailed {
        local_id: local.id,
        alma_id: alma_payment_id.to_string(),
        reason,
    };

    let client = bridge
        .client(None)
        .ok_or_else(|| fetch_failed("API client unavailable".to_string()))?;

    let record = client
        .fetch_payment(alma_payment_id)
        .await
        .map_err(|e| fetch_failed(e.to_string()))?
        .ok_or_else(|| PaymentError::NotFound {
            local_id: local.id,
            alma_id: alma_payment_id.to_string(),
        })?;

    let result = evaluate(local, &record);
    match &result {
        Ok(rec) if rec.valid => {
            tracing::info!(payment_id = local.id, alma_payment_id, "Alma payment validated");
        }
        Ok(rec) => {
            let reasons: Vec<String> = rec.failures.iter().map(ToString::to_string).collect();
            tracing::warn!(
                payment_id = local.id,
                alma_payment_id,
                reasons = %reasons.join("; "),
                "Alma payment failed trust checks"
            );
        }
        Err(e) => {
            tracing::error!(payment_id = local.id, alma_payment_id, error = %e, "Alma payment ownership check failed");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn local() -> LocalPayment {
        LocalPayment::new(42, 10000, "EUR")
    }

    fn record() -> AlmaPayment {
        serde_json::from_value(json!({
            "id": "payment_11uPRjP4L9Dgbttx",
            "state": "in_progress",
            "purchase_amount": 10000,
            "expired_at": null,
            "custom_data": {"payment_id": 42},
            "payment_plan": [
                {"state": "paid", "purchase_amount": 3334},
                {"state": "pending", "purchase_amount": 3333}
            ],
            "orders": [{"merchant_reference": "000042", "id": "order_1"}],
            "kind": "P1X"
        }))
        .unwrap()
    }

    #[test]
    fn all_checks_pass() {
        let rec = evaluate(&local(), &record()).unwrap();
        assert!(rec.valid);
        assert!(rec.failures.is_empty());
        assert_eq!(rec.validation(), Validation::Valid);
    }

    #[test]
    fn paid_state_is_accepted() {
        let mut r = record();
        r.state = "paid".into();
        assert!(evaluate(&local(), &r).unwrap().valid);
    }

    #[test]
    fn each_check_flips_the_result() {
        let mutations: Vec<(&str, Box<dyn Fn(&mut AlmaPayment)>)> = vec![
            ("amount", Box::new(|r: &mut AlmaPayment| r.purchase_amount = 9999)),
            ("expired", Box::new(|r: &mut AlmaPayment| r.expired_at = Some(1_700_000_000))),
            ("state", Box::new(|r: &mut AlmaPayment| r.state = "expired".into())),
            ("installment", Box::new(|r: &mut AlmaPayment| r.payment_plan[0].state = "pending".into())),
            ("empty plan", Box::new(|r: &mut AlmaPayment| r.payment_plan.clear())),
        ];
        for (name, mutate) in mutations {
            let mut r = record();
            mutate(&mut r);
            let rec = evaluate(&local(), &r).unwrap();
            assert!(!rec.valid, "{name} should fail");
            assert_eq!(rec.failures.len(), 1, "{name}: {:?}", rec.failures);
        }
    }

    #[test]
    fn ownership_mismatch_raises_regardless_of_other_checks() {
        let mut r = record();
        r.custom_data = Some(serde_json::from_value(json!({"payment_id": 7})).unwrap());
        let err = evaluate(&local(), &r).unwrap_err();
        assert!(matches!(err, PaymentError::IdMismatch { found: Some(7), .. }));

        r.purchase_amount = 1;
        r.state = "expired".into();
        assert!(evaluate(&local(), &r).unwrap_err().is_id_mismatch());

        r.custom_data = None;
        assert!(matches!(
            evaluate(&local(), &r).unwrap_err(),
            PaymentError::IdMismatch { found: None, .. }
        ));
    }

    #[test]
    fn snapshot_flattens_orders_and_keeps_extra_fields() {
        let snap = snapshot(&record());
        assert_eq!(snap["kind"], json!("P1X"));
        assert_eq!(snap["orders"][0]["merchant_reference"], json!("000042"));
        assert_eq!(snap["orders"][0]["comment"], Value::Null);
        assert_eq!(snap["payment_plan"][0]["state"], json!("paid"));
        assert_eq!(snap["custom_data"]["payment_id"], json!(42));
    }

    #[test]
    fn apply_sets_flag_and_snapshot() {
        let mut r = record();
        r.purchase_amount = 1;
        let rec = evaluate(&local(), &r).unwrap();
        let mut details = PaymentDetails::default();
        rec.apply(&mut details);
        assert_eq!(details.is_valid, Validation::Invalid);
        assert_eq!(details.payment_data.unwrap()["purchase_amount"], json!(1));
    }

    #[test]
    fn failures_render_for_logs() {
        let msg = TrustFailure::AmountMismatch {
            expected: 100,
            actual: 90,
        }
        .to_string();
        assert!(msg.contains("90") && msg.contains("100"));
        assert_eq!(
            TrustFailure::FirstInstallmentUnpaid(None).to_string(),
            "payment plan is empty"
        );
    }
}
