//! IPN signature verification.
//!
//! Alma signs each IPN callback with HMAC-SHA256 over the Alma payment id,
//! keyed with the merchant's API key for the active mode, and sends the
//! lowercase hex MAC in the `X-Alma-Signature` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::SecurityError;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over the given body bytes using the shared secret.
/// Returns the hex-encoded MAC.
pub fn compute_hmac(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check an HMAC-SHA256 signature against the expected body.
///
/// Uses constant-time comparison. Only the 64-character lowercase hex form is
/// accepted; anything else is compared against zeros so a malformed signature
/// still goes through the full MAC computation.
pub fn verify_hmac(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);

    let expected = hex::decode(signature)
        .filter(|raw| raw.len() == 32)
        .unwrap_or_else(|| vec![0u8; 32]);

    mac.verify_slice(&expected).is_ok()
}

/// Verify the signature of an IPN callback for `payment_id`.
///
/// `shared_secret` is the active-mode API key. Empty inputs never verify.
pub fn verify(payment_id: &str, shared_secret: &str, signature: &str) -> Result<(), SecurityError> {
    let well_formed = !payment_id.is_empty() && !shared_secret.is_empty() && !signature.is_empty();

    let matches = verify_hmac(shared_secret.as_bytes(), payment_id.as_bytes(), signature);

    if well_formed && matches {
        Ok(())
    } else {
        Err(SecurityError::SignatureMismatch {
            payment_id: payment_id.to_string(),
        })
    }
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
            s
        })
    }

    /// Lowercase hex only.
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        let digit = |c: u8| match c {
            b'0'..=b'9' => Some(c - b'0'),
            b'a'..=b'f' => Some(c - b'a' + 10),
            _ => None,
        };
        if s.len() % 2 != 0 {
            return None;
        }
        s.as_bytes()
            .chunks(2)
            .map(|pair| Some(digit(pair[0])? << 4 | digit(pair[1])?))
            .collect()
    }
}
