//! Webhook signature verification.
//!
//! Stripe signs each delivery with a `Stripe-Signature` header of the form
//! `t=<unix>,v1=<hex>[,v1=<hex>...]`. The signed payload is `"{t}.{body}"`
//! under HMAC-SHA256 with the endpoint secret.

use crate::crypto::{constant_time_eq, hmac_sha256_hex};

use super::client::StripeError;

/// Seconds a signature timestamp may sit ahead of our clock.
const CLOCK_SKEW_SECONDS: i64 = 60;

/// Parsed `Stripe-Signature` header.
#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<SignatureHeader<'_>, StripeError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", ts)) => {
                timestamp = Some(ts.parse().map_err(|_| StripeError::InvalidSignature)?);
            }
            Some(("v1", sig)) if !sig.is_empty() => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature)?;
    if signatures.is_empty() {
        return Err(StripeError::InvalidSignature);
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// Verify a webhook delivery.
///
/// # Arguments
///
/// * `payload` - Raw request body
/// * `header` - Value of the `Stripe-Signature` header
/// * `secret` - Endpoint signing secret (`whsec_...`)
/// * `tolerance_seconds` - Maximum age of the signature timestamp
/// * `now` - Current Unix time
///
/// # Errors
///
/// Returns `StripeError::InvalidSignature` for a malformed header or when no
/// `v1` signature matches, and `StripeError::SignatureExpired` when the
/// timestamp is older than the tolerance or too far in the future.
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    tolerance_seconds: u64,
    now: i64,
) -> Result<(), StripeError> {
    let parsed = parse_header(header)?;

    let expected = hmac_sha256_hex(secret, &format!("{}.{payload}", parsed.timestamp))
        .map_err(|e| StripeError::Configuration(e.to_string()))?;

    if !parsed
        .signatures
        .iter()
        .any(|sig| constant_time_eq(&expected, sig))
    {
        return Err(StripeError::InvalidSignature);
    }

    let tolerance = i64::try_from(tolerance_seconds).unwrap_or(i64::MAX);
    let age = now.saturating_sub(parsed.timestamp);
    if age > tolerance || age < -CLOCK_SKEW_SECONDS {
        return Err(StripeError::SignatureExpired);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const BODY: &str = r#"{"id":"evt_1","type":"invoice.paid"}"#;

    fn sign(timestamp: i64) -> String {
        let sig = hmac_sha256_hex(SECRET, &format!("{timestamp}.{BODY}")).unwrap();
        format!("t={timestamp},v1={sig}")
    }

    #[test]
    fn valid_signature_passes() {
        let now = 1_700_000_000;
        assert!(verify_signature(BODY, &sign(now - 10), SECRET, 300, now).is_ok());
    }

    #[test]
    fn any_v1_may_match() {
        let now = 1_700_000_000;
        let header = format!("{},v1=deadbeef,v0=ignored", sign(now)).replacen(
            "v1=",
            "v1=00ff,v1=",
            1,
        );
        assert!(verify_signature(BODY, &header, SECRET, 300, now).is_ok());
    }

    #[test]
    fn tampered_body_fails() {
        let now = 1_700_000_000;
        let err = verify_signature("{}", &sign(now), SECRET, 300, now).unwrap_err();
        assert!(matches!(err, StripeError::InvalidSignature));
    }

    #[test]
    fn wrong_secret_fails() {
        let now = 1_700_000_000;
        let err = verify_signature(BODY, &sign(now), "whsec_other", 300, now).unwrap_err();
        assert!(matches!(err, StripeError::InvalidSignature));
    }

    #[test]
    fn stale_timestamp_fails() {
        let now = 1_700_000_000;
        let err = verify_signature(BODY, &sign(now - 301), SECRET, 300, now).unwrap_err();
        assert!(matches!(err, StripeError::SignatureExpired));
    }

    #[test]
    fn future_timestamp_beyond_skew_fails() {
        let now = 1_700_000_000;
        assert!(verify_signature(BODY, &sign(now + 30), SECRET, 300, now).is_ok());
        let err = verify_signature(BODY, &sign(now + 120), SECRET, 300, now).unwrap_err();
        assert!(matches!(err, StripeError::SignatureExpired));
    }

    #[test]
    fn malformed_headers_fail() {
        let now = 1_700_000_000;
        for header in ["", "garbage", "t=abc,v1=00", "v1=00", "t=1700000000"] {
            assert!(
                matches!(
                    verify_signature(BODY, header, SECRET, 300, now),
                    Err(StripeError::InvalidSignature)
                ),
                "header {header:?}"
            );
        }
    }
}
