//! Constant-time comparison for secrets handled outside the IPN signature path
//! (bearer tokens on operational endpoints).

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Constant-time byte comparison that does not leak input lengths or content.
///
/// Both inputs are hashed to fixed-length SHA-256 digests before comparison,
/// so timing reveals neither the content nor the length of either input.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

/// Redact an API key for logs: keeps the mode prefix, hides the rest.
pub fn redact_key(key: &str) -> String {
    match key.rfind('_') {
        Some(idx) if idx + 1 < key.len() => format!("{}***", &key[..=idx]),
        _ if key.is_empty() => String::new(),
        _ => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_match() {
        assert!(constant_time_eq(b"hello", b"hello"));
    }

    #[test]
    fn different_inputs_do_not_match() {
        assert!(!constant_time_eq(b"hello", b"world"));
    }

    #[test]
    fn different_length_inputs_do_not_match() {
        assert!(!constant_time_eq(b"short", b"much longer string"));
    }

    #[test]
    fn redact_keeps_prefix_only() {
        assert_eq!(redact_key("sk_live_abcdef"), "sk_live_***");
        assert_eq!(redact_key("opaque"), "***");
        assert_eq!(redact_key(""), "");
    }
}
