//! Alma API records, as returned by the provider.
//!
//! Unknown fields are kept in `extra` so the snapshot persisted on the local
//! payment carries the full record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::CUSTOM_DATA_PAYMENT_ID;

/// The provider's view of a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlmaPayment {
    pub id: String,
    #[serde(default)]
    pub state: String,
    pub purchase_amount: i64,
    #[serde(default)]
    pub expired_at: Option<i64>,
    #[serde(default)]
    pub custom_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub payment_plan: Vec<Installment>,
    #[serde(default)]
    pub orders: Vec<AlmaOrder>,
    /// Customer-facing payment page, set on freshly created payments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AlmaPayment {
    /// The local payment id recorded in `custom_data` at creation time.
    ///
    /// Only an integer counts; a string such as `"42"` is not an id.
    pub fn custom_payment_id(&self) -> Option<i64> {
        self.custom_data
            .as_ref()?
            .get(CUSTOM_DATA_PAYMENT_ID)?
            .as_i64()
    }

    pub fn first_installment(&self) -> Option<&Installment> {
        self.payment_plan.first()
    }
}

/// One installment of a payment plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub purchase_amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A merchant order reference attached to an Alma payment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlmaOrder {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub customer_url: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub merchant_reference: Option<String>,
    #[serde(default)]
    pub merchant_url: Option<String>,
    #[serde(default)]
    pub payment: Option<String>,
}

impl AlmaOrder {
    /// Plain key/value form stored on the local payment.
    pub fn to_flat_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("comment".into(), opt_str(&self.comment));
        map.insert(
            "created".into(),
            self.created.map(Value::from).unwrap_or(Value::Null),
        );
        map.insert("customer_url".into(), opt_str(&self.customer_url));
        map.insert("data".into(), self.data.clone().unwrap_or(Value::Null));
        map.insert("id".into(), opt_str(&self.id));
        map.insert(
            "merchant_reference".into(),
            opt_str(&self.merchant_reference),
        );
        map.insert("merchant_url".into(), opt_str(&self.merchant_url));
        map.insert("payment".into(), opt_str(&self.payment));
        map
    }
}

fn opt_str(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

/// Merchant account behind the configured API key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Eligibility of a cart for one installment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub installments_count: u8,
    #[serde(default)]
    pub deferred_days: u32,
    #[serde(default)]
    pub deferred_months: u32,
    #[serde(default)]
    pub customer_total_cost_amount: i64,
    #[serde(default)]
    pub annual_interest_rate: Option<f64>,
    #[serde(default)]
    pub payment_plan: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Value>,
}

impl Eligibility {
    /// Provider-side plan key, e.g. `general_3_0_0`.
    pub fn plan_key(&self) -> String {
        plan_key(self.installments_count, self.deferred_days, self.deferred_months)
    }
}

pub fn plan_key(installments_count: u8, deferred_days: u32, deferred_months: u32) -> String {
    format!("general_{installments_count}_{deferred_days}_{deferred_months}")
}

/// The eligibility endpoint answers with a single record or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::Many(v) => v,
            OneOrMany::One(t) => vec![t],
        }
    }
}
