//! Cart eligibility and the installment-plan figures shown at checkout.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::bridge::AlmaBridge;
use crate::types::{plan_key, Eligibility};

/// Cart data sent to the eligibility endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EligibilityQuery {
    pub purchase_amount: i64,
    #[serde(default)]
    pub billing_country: Option<String>,
    #[serde(default)]
    pub shipping_country: Option<String>,
    /// Two-letter language code; longer tags are cut down.
    #[serde(default)]
    pub locale: Option<String>,
}

impl EligibilityQuery {
    pub fn new(purchase_amount: i64) -> Self {
        Self {
            purchase_amount,
            billing_country: None,
            shipping_country: None,
            locale: None,
        }
    }

    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "payment": { "purchase_amount": self.purchase_amount },
        });
        if let Some(country) = &self.billing_country {
            payload["payment"]["billing_address"] = json!({ "country": country });
        }
        if let Some(country) = &self.shipping_country {
            payload["payment"]["shipping_address"] = json!({ "country": country });
        }
        if let Some(locale) = &self.locale {
            let lang: String = locale.chars().take(2).collect();
            if !lang.is_empty() {
                payload["payment"]["locale"] = Value::String(lang);
            }
        }
        payload
    }
}

/// Credit figures for one plan, in minor units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallmentPlanView {
    pub installments_count: u8,
    pub total_cart: i64,
    pub cost_credit: i64,
    pub total_credit: i64,
    /// Annual effective rate, as reported by Alma.
    pub taeg: Option<f64>,
    pub plan: Vec<Value>,
}

impl InstallmentPlanView {
    pub fn from_eligibility(total_cart: i64, eligibility: &Eligibility) -> Self {
        let cost_credit = eligibility.customer_total_cost_amount;
        Self {
            installments_count: eligibility.installments_count,
            total_cart,
            cost_credit,
            total_credit: cost_credit.saturating_add(total_cart),
            taeg: eligibility.annual_interest_rate,
            plan: eligibility.payment_plan.clone(),
        }
    }
}

/// Plan for `installments_count` with no deferral, if the cart is eligible.
pub async fn installment_plan(
    bridge: &AlmaBridge,
    query: &EligibilityQuery,
    installments_count: u8,
) -> Option<InstallmentPlanView> {
    if query.purchase_amount <= 0 {
        return None;
    }
    let wanted = plan_key(installments_count, 0, 0);
    bridge
        .eligibilities(query.to_payload(), &[installments_count])
        .await
        .iter()
        .find(|e| e.eligible && e.plan_key() == wanted)
        .map(|e| InstallmentPlanView::from_eligibility(query.purchase_amount, e))
}
