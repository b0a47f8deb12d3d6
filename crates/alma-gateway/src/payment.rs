//! The host's payment record, as seen by the gateway.
//!
//! The host persists `details` as a generic string-keyed map; [`PaymentDetails`]
//! is the typed view used everywhere else. Conversion happens only at the
//! storage boundary ([`PaymentDetails::from_map`] / [`PaymentDetails::to_map`]).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Lifecycle of a local payment. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalPaymentState {
    #[default]
    New,
    Processing,
    Captured,
    Failed,
}

impl LocalPaymentState {
    /// Still waiting on the provider: reconciliation may run.
    pub fn is_open(&self) -> bool {
        matches!(self, LocalPaymentState::New | LocalPaymentState::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    fn rank(&self) -> u8 {
        match self {
            LocalPaymentState::New => 0,
            LocalPaymentState::Processing => 1,
            LocalPaymentState::Captured | LocalPaymentState::Failed => 2,
        }
    }
}

/// Outcome of provider validation, persisted under `is_valid`.
///
/// `Unknown` (key absent or `null`) is distinct from `Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

impl Validation {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            None => Validation::Unknown,
            Some(true) => Validation::Valid,
            Some(false) => Validation::Invalid,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Validation::Unknown => None,
            Validation::Valid => Some(true),
            Validation::Invalid => Some(false),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Validation::Unknown)
    }
}

impl Serialize for Validation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_flag().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Validation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<bool>::deserialize(deserializer).map(Validation::from_flag)
    }
}

/// Typed view of the `details` map stored on a local payment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Alma payment id linked to this payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Validation::is_unknown")]
    pub is_valid: Validation,
    /// Redirect/display payload produced at checkout. Dropped once the payment settles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Snapshot of the provider record taken at reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_data: Option<Value>,
    /// Keys owned by someone else; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PaymentDetails {
    pub fn from_map(map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(map))
    }

    pub fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Drop the checkout payload. Returns whether anything was removed.
    pub fn clear_payload(&mut self) -> bool {
        self.payload.take().is_some()
    }
}

/// A payment owned by the host order subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPayment {
    pub id: i64,
    /// Amount in minor units.
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub state: LocalPaymentState,
    #[serde(default)]
    pub details: PaymentDetails,
}

impl LocalPayment {
    pub fn new(id: i64, amount: i64, currency: impl Into<String>) -> Self {
        Self {
            id,
            amount,
            currency: currency.into(),
            state: LocalPaymentState::New,
            details: PaymentDetails::default(),
        }
    }

    /// Move the lifecycle forward. Terminal states and backward moves are refused.
    pub fn advance_to(&mut self, next: LocalPaymentState) -> bool {
        if self.state.is_terminal() || next.rank() <= self.state.rank() {
            return false;
        }
        tracing::debug!(
            payment_id = self.id,
            from = ?self.state,
            to = ?next,
            "payment state advanced"
        );
        self.state = next;
        true
    }
}
