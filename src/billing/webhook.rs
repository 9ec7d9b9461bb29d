//! Whop webhook ingestion: HMAC-SHA-256 signature verification over the
//! raw request body, compared in constant time.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub action: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize, Default)]
pub struct WebhookData {
    #[serde(rename = "membership_id")]
    pub membership_id: Option<String>,
    #[serde(rename = "plan_id")]
    pub plan_id: Option<String>,
    #[serde(rename = "user_id")]
    pub user_id: Option<String>,
    #[serde(rename = "period_start")]
    pub period_start: Option<DateTime<Utc>>,
    #[serde(rename = "period_end")]
    pub period_end: Option<DateTime<Utc>>,
    pub valid: Option<bool>,
}

/// Verify `signature` (hex-encoded HMAC-SHA-256 of `raw_body` under
/// `secret`) in constant time.
///
/// A missing secret bypasses verification entirely (development
/// convenience) with a WARNING log; this must never be relied on in
/// production.
pub fn verify_signature(raw_body: &[u8], signature: &str, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        warn!("WHOP_WEBHOOK_SECRET not configured — bypassing webhook signature verification");
        return true;
    };

    let Ok(expected_bytes) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    let computed = mac.finalize().into_bytes();

    computed.ct_eq(&expected_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_is_accepted() {
        let secret = "test-secret";
        let body = br#"{"action":"membership.went_valid","data":{}}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(verify_signature(body, &sig, Some(secret)));
    }

    #[test]
    fn mismatched_signature_is_rejected() {
        let body = br#"{"action":"membership.went_valid","data":{}}"#;
        assert!(!verify_signature(body, "deadbeef", Some("test-secret")));
    }

    #[test]
    fn missing_secret_bypasses_verification() {
        let body = br#"{"action":"membership.went_valid","data":{}}"#;
        assert!(verify_signature(body, "anything-at-all", None));
    }
}
