//! Stripe webhook signature verification.
//!
//! Stripe signs `"{timestamp}.{raw body}"` with HMAC-SHA256 and sends
//! `Stripe-Signature: t=<timestamp>,v1=<hex>`. Several `v1` entries can be
//! present while a signing secret is being rolled.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// Reasons a webhook signature is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header has no timestamp")]
    MissingTimestamp,
    #[error("signature header has no v1 signature")]
    MissingSignature,
    #[error("signature timestamp is not a number")]
    InvalidTimestamp,
    #[error("signature is {age}s old")]
    Expired { age: i64 },
    #[error("signing secret is unusable")]
    InvalidKey,
    #[error("signature mismatch")]
    Mismatch,
}

/// Verify a `Stripe-Signature` header against the raw request body.
///
/// `tolerance_secs` of zero skips the timestamp age check.
///
/// # Errors
///
/// Returns a `SignatureError` describing why the signature was rejected.
pub fn verify_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    if tolerance_secs > 0 {
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;
        let age = now - ts;
        if age.unsigned_abs() > tolerance_secs {
            return Err(SignatureError::Expired { age });
        }
    }

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    if signatures
        .iter()
        .any(|signature| constant_time_compare(&expected, signature))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Whether an event was sent on behalf of a connected account.
///
/// Connected-account events carry an `account` field and are signed with the
/// Connect endpoint's secret; our own account's events are not.
#[must_use]
pub fn uses_connect_secret(event: &serde_json::Value) -> bool {
    event.get("account").is_some_and(|account| !account.is_null())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn sign(timestamp: i64, payload: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).expect("valid key length");
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let payload = r#"{"id":"evt_1","type":"charge.succeeded"}"#;
        let header = format!("t={NOW},v1={}", sign(NOW, payload));
        assert_eq!(
            verify_signature(&header, payload.as_bytes(), SECRET, 300, NOW),
            Ok(())
        );
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = "{}";
        let header = format!("t={NOW},v1=deadbeef,v1={},v0=ignored", sign(NOW, payload));
        assert!(verify_signature(&header, payload.as_bytes(), SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn test_tampered_payload() {
        let header = format!("t={NOW},v1={}", sign(NOW, r#"{"amount":100}"#));
        assert_eq!(
            verify_signature(&header, br#"{"amount":999}"#, SECRET, 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret() {
        let payload = "{}";
        let header = format!("t={NOW},v1={}", sign(NOW, payload));
        assert_eq!(
            verify_signature(&header, payload.as_bytes(), "whsec_other", 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_missing_parts() {
        assert_eq!(
            verify_signature("v1=abc", b"{}", SECRET, 300, NOW),
            Err(SignatureError::MissingTimestamp)
        );
        assert_eq!(
            verify_signature(&format!("t={NOW}"), b"{}", SECRET, 300, NOW),
            Err(SignatureError::MissingSignature)
        );
        assert_eq!(
            verify_signature("", b"{}", SECRET, 300, NOW),
            Err(SignatureError::MissingTimestamp)
        );
    }

    #[test]
    fn test_old_timestamp() {
        let then = NOW - 600;
        let header = format!("t={then},v1={}", sign(then, "{}"));
        assert_eq!(
            verify_signature(&header, b"{}", SECRET, 300, NOW),
            Err(SignatureError::Expired { age: 600 })
        );
        // Zero tolerance skips the age check
        assert!(verify_signature(&header, b"{}", SECRET, 0, NOW).is_ok());
    }

    #[test]
    fn test_invalid_timestamp() {
        assert_eq!(
            verify_signature("t=soon,v1=abc", b"{}", SECRET, 300, NOW),
            Err(SignatureError::InvalidTimestamp)
        );
    }

    #[test]
    fn test_uses_connect_secret() {
        assert!(uses_connect_secret(&serde_json::json!({"account": "acct_1"})));
        assert!(!uses_connect_secret(&serde_json::json!({"account": null})));
        assert!(!uses_connect_secret(&serde_json::json!({"id": "evt_1"})));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
