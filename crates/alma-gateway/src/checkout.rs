//! Payment initiation: creates the Alma payment and stores what the checkout
//! page needs to send the customer there.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::bridge::AlmaBridge;
use crate::config::PaymentPageMode;
use crate::constants::{ALLOWED_CURRENCY_CODES, CUSTOM_DATA_PAYMENT_ID};
use crate::error::PaymentError;
use crate::payment::{LocalPayment, LocalPaymentState};

/// Host hook that enriches the outbound payment-creation payload
/// (customer, addresses, order references).
pub trait PaymentDataBuilder: Send + Sync {
    fn build(&self, data: Value, payment: &LocalPayment) -> Value;
}

impl<F> PaymentDataBuilder for F
where
    F: Fn(Value, &LocalPayment) -> Value + Send + Sync,
{
    fn build(&self, data: Value, payment: &LocalPayment) -> Value {
        self(data, payment)
    }
}

/// Sends the base payload unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasePaymentData;

impl PaymentDataBuilder for BasePaymentData {
    fn build(&self, data: Value, _payment: &LocalPayment) -> Value {
        data
    }
}

/// Where Alma sends the customer back to, and where it posts IPN callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutUrls {
    pub return_url: String,
    pub ipn_callback_url: String,
}

impl CheckoutUrls {
    /// Standard URLs for `payment_id` under `base_url`.
    pub fn for_payment(base_url: &str, payment_id: i64) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            return_url: format!("{base}/payments/{payment_id}/status"),
            ipn_callback_url: format!("{base}/payments/{payment_id}/notify"),
        }
    }
}

/// Stored under `details.payload` until the payment settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPayload {
    pub id: String,
    pub url: String,
    pub payment_page_mode: PaymentPageMode,
}

fn base_payment_data(payment: &LocalPayment, installments_count: u8, urls: &CheckoutUrls) -> Value {
    json!({
        "payment": {
            "purchase_amount": payment.amount,
            "installments_count": installments_count,
            "return_url": urls.return_url,
            "ipn_callback_url": urls.ipn_callback_url,
            "custom_data": { CUSTOM_DATA_PAYMENT_ID: payment.id },
        }
    })
}

/// Host builders may add fields but never relink the payment.
fn pin_payment_id(data: Value, payment_id: i64) -> Value {
    let mut root = match data {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let payment = root
        .entry("payment")
        .or_insert_with(|| Value::Object(Map::new()));
    if !payment.is_object() {
        *payment = Value::Object(Map::new());
    }
    if let Some(payment) = payment.as_object_mut() {
        let custom = payment
            .entry("custom_data")
            .or_insert_with(|| Value::Object(Map::new()));
        if !custom.is_object() {
            *custom = Value::Object(Map::new());
        }
        if let Some(custom) = custom.as_object_mut() {
            custom.insert(CUSTOM_DATA_PAYMENT_ID.into(), Value::from(payment_id));
        }
    }
    Value::Object(root)
}

/// Create the Alma payment for `payment`, or return the one already created.
///
/// On success the payload is stored on the payment details and the lifecycle
/// moves to `Processing`.
pub async fn initiate_payment(
    bridge: &AlmaBridge,
    builder: &dyn PaymentDataBuilder,
    payment: &mut LocalPayment,
    urls: &CheckoutUrls,
) -> Result<CheckoutPayload, PaymentError> {
    if !ALLOWED_CURRENCY_CODES.contains(&payment.currency.as_str()) {
        return Err(PaymentError::UnsupportedCurrency(payment.currency.clone()));
    }

    if let Some(existing) = payment
        .details
        .payload
        .clone()
        .and_then(|p| serde_json::from_value::<CheckoutPayload>(p).ok())
    {
        return Ok(existing);
    }

    if payment.state.is_terminal() {
        return Err(PaymentError::CreateFailed {
            local_id: payment.id,
            reason: "payment is already settled".to_string(),
        });
    }

    let config = bridge.gateway_config();
    let data = base_payment_data(payment, config.installments_count, urls);
    let data = pin_payment_id(builder.build(data, payment), payment.id);

    let client = bridge.client(None).ok_or(PaymentError::ClientUnavailable)?;
    let created = client
        .create_payment(&data)
        .await
        .map_err(|e| PaymentError::CreateFailed {
            local_id: payment.id,
            reason: e.to_string(),
        })?;

    let url = created.url.clone().ok_or_else(|| PaymentError::CreateFailed {
        local_id: payment.id,
        reason: format!("Alma payment {} has no payment page URL", created.id),
    })?;

    let payload = CheckoutPayload {
        id: created.id,
        url,
        payment_page_mode: config.payment_page_mode,
    };
    payment.details.payment_id = Some(payload.id.clone());
    payment.details.payload = Some(json!({
        "id": payload.id,
        "url": payload.url,
        "payment_page_mode": payload.payment_page_mode,
    }));
    payment.advance_to(LocalPaymentState::Processing);

    tracing::info!(
        payment_id = payment.id,
        alma_payment_id = %payload.id,
        "Alma payment created"
    );
    Ok(payload)
}
