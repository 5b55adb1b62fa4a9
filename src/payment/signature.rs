//! Webhook signature scheme.
//!
//! The provider signs `"{timestamp}.{body}"` with HMAC-SHA256 under the
//! shared webhook secret and sends `t=<unix>,v1=<hex>` in the signature
//! header. Verification checks both the MAC and timestamp freshness.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted skew between the signed timestamp and now.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Compute the hex signature for a payload at a given timestamp. Also used
/// by tests to forge provider deliveries.
pub fn sign(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Render the full signature header for a payload.
pub fn header(secret: &str, payload: &[u8], timestamp: i64) -> String {
    format!("t={},v1={}", timestamp, sign(secret, payload, timestamp))
}

/// Verify a signature header against a payload. Returns `false` for a wrong
/// or stale signature and for any malformed header.
pub fn verify(secret: &str, payload: &[u8], signature_header: &str, tolerance_secs: i64) -> bool {
    let mut timestamp: Option<i64> = None;
    let mut provided: Option<Vec<u8>> = None;
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => provided = hex::decode(value).ok(),
            _ => {}
        }
    }
    let (Some(timestamp), Some(provided)) = (timestamp, provided) else {
        return false;
    };

    let age = chrono::Utc::now().timestamp() - timestamp;
    if age.abs() > tolerance_secs {
        return false;
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = header(SECRET, payload, now());
        assert!(verify(SECRET, payload, &header, DEFAULT_TOLERANCE_SECS));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = header("wrong_secret", payload, now());
        assert!(!verify(SECRET, payload, &header, DEFAULT_TOLERANCE_SECS));
    }

    #[test]
    fn test_modified_payload_rejected() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let tampered = br#"{"type":"checkout.session.completed","hacked":true}"#;
        let header = header(SECRET, payload, now());
        assert!(!verify(SECRET, tampered, &header, DEFAULT_TOLERANCE_SECS));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = br#"{}"#;
        // 10 minutes old, beyond the 5-minute tolerance
        let header = header(SECRET, payload, now() - 600);
        assert!(!verify(SECRET, payload, &header, DEFAULT_TOLERANCE_SECS));
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let payload = br#"{}"#;
        for header in ["", "garbage", "t=123", "v1=abcd", "t=notanumber,v1=zz"] {
            assert!(
                !verify(SECRET, payload, header, DEFAULT_TOLERANCE_SECS),
                "header {header:?} should be rejected"
            );
        }
    }
}
