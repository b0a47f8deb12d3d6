use std::time::Duration;

/// Production API root.
pub const LIVE_API_ROOT: &str = "https://api.getalma.eu";

/// Sandbox API root used in test mode.
pub const TEST_API_ROOT: &str = "https://api.sandbox.getalma.eu";

/// Header carrying the HMAC of the Alma payment id on IPN callbacks.
pub const SIGNATURE_HEADER: &str = "X-Alma-Signature";

/// Query parameter carrying the Alma payment id on IPN callbacks and customer returns.
pub const QUERY_PARAM_PID: &str = "pid";

/// Keys of the local payment `details` map managed by this crate.
pub const DETAILS_KEY_PAYMENT_ID: &str = "payment_id";
pub const DETAILS_KEY_IS_VALID: &str = "is_valid";
pub const DETAILS_KEY_PAYLOAD: &str = "payload";
pub const DETAILS_KEY_PAYMENT_DATA: &str = "payment_data";

/// Key inside the provider's `custom_data` linking back to the local payment.
pub const CUSTOM_DATA_PAYMENT_ID: &str = "payment_id";

/// Alma only accepts euro-denominated payments.
pub const ALLOWED_CURRENCY_CODES: &[&str] = &["EUR"];

/// Installment counts a merchant can offer through this gateway.
pub const ALLOWED_INSTALLMENTS_COUNTS: &[u8] = &[2, 3, 4];

pub const DEFAULT_INSTALLMENTS_COUNT: u8 = 3;

/// Default timeout on outbound provider requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts at a read, reconcile, compare-and-save cycle before giving up.
pub const MAX_SAVE_ATTEMPTS: usize = 3;

/// Provider payment states accepted by reconciliation.
pub const STATE_IN_PROGRESS: &str = "in_progress";
pub const STATE_PAID: &str = "paid";

/// Installment state required on the first installment.
pub const INSTALLMENT_STATE_PAID: &str = "paid";
