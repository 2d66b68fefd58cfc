//! Webhook signature verification and batch decoding.
//!
//! The processor signs the raw request body with HMAC-SHA256 using the
//! shared webhook secret and sends the hex digest in `webhook-signature`.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::webhook_errors::WebhookError;
use super::webhook_event::EventBatch;

type HmacSha256 = Hmac<Sha256>;

/// Name of the header carrying the hex signature.
pub const SIGNATURE_HEADER: &str = "webhook-signature";

/// Verifier bound to one shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// True only if `signature` is the hex HMAC-SHA256 of `raw_body`.
    ///
    /// Empty or undecodable signatures return false. The digest comparison
    /// runs in constant time.
    pub fn verify(&self, raw_body: &[u8], signature: &str) -> bool {
        let signature = signature.trim();
        if signature.is_empty() {
            return false;
        }
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        let Some(expected) = hmac_digest(self.secret.expose_secret().as_bytes(), raw_body) else {
            return false;
        };
        constant_time_compare(&expected, &provided)
    }

    /// Decodes the JSON envelope into an ordered event batch.
    pub fn parse(&self, raw_body: &[u8]) -> Result<EventBatch, WebhookError> {
        serde_json::from_slice(raw_body).map_err(|e| WebhookError::ParseError(e.to_string()))
    }

    /// Verifies, then parses. Nothing is decoded from an unverified body.
    pub fn verify_and_parse(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<EventBatch, WebhookError> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;
        if !self.verify(raw_body, signature) {
            return Err(WebhookError::InvalidSignature);
        }
        self.parse(raw_body)
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

fn hmac_digest(key: &[u8], body: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(body);
    Some(mac.finalize().into_bytes().to_vec())
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Hex HMAC-SHA256 of `body`, as the processor would send it.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    hmac_digest(secret.as_bytes(), body)
        .map(hex::encode)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "wh_secret_test_9f2c";

    const BODY: &[u8] = br#"{"events":[{"id":"EV123","created_at":"2024-01-15T10:30:00.000Z","resource_type":"subscriptions","action":"created","links":{"subscription":"SB123"}}]}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::new(TEST_SECRET.to_string()))
    }

    // ══════════════════════════════════════════════════════════════
    // Signature Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn valid_signature_verifies() {
        let signature = compute_signature(TEST_SECRET, BODY);
        assert!(verifier().verify(BODY, &signature));
    }

    #[test]
    fn altered_body_fails_verification() {
        let signature = compute_signature(TEST_SECRET, BODY);
        let mut tampered = BODY.to_vec();
        tampered[20] ^= 0x01;
        assert!(!verifier().verify(&tampered, &signature));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let signature = compute_signature("another_secret", BODY);
        assert!(!verifier().verify(BODY, &signature));
    }

    #[test]
    fn empty_signature_fails_verification() {
        assert!(!verifier().verify(BODY, ""));
        assert!(!verifier().verify(BODY, "   "));
    }

    #[test]
    fn non_hex_signature_fails_verification() {
        assert!(!verifier().verify(BODY, "not-hex-at-all"));
    }

    #[test]
    fn truncated_signature_fails_verification() {
        let signature = compute_signature(TEST_SECRET, BODY);
        assert!(!verifier().verify(BODY, &signature[..32]));
    }

    #[test]
    fn uppercase_hex_signature_verifies() {
        let signature = compute_signature(TEST_SECRET, BODY).to_uppercase();
        assert!(verifier().verify(BODY, &signature));
    }

    // ══════════════════════════════════════════════════════════════
    // Parsing Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parses_batch_in_order() {
        let body = br#"{"events":[
            {"id":"EV1","created_at":"2024-01-15T10:30:00Z","resource_type":"payments","action":"confirmed","links":{"payment":"PM1","subscription":"SB1"}},
            {"id":"EV2","created_at":"2024-01-15T10:31:00Z","resource_type":"refunds","action":"created"}
        ]}"#;
        let batch = verifier().parse(body).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.events[0].id, "EV1");
        assert_eq!(batch.events[0].links.subscription.as_deref(), Some("SB1"));
        assert_eq!(batch.events[1].kind(), None);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let result = verifier().parse(b"{\"events\": [");
        assert!(matches!(result, Err(WebhookError::ParseError(_))));
    }

    #[test]
    fn missing_events_key_is_a_parse_error() {
        let result = verifier().parse(b"{\"data\": []}");
        assert!(matches!(result, Err(WebhookError::ParseError(_))));
    }

    #[test]
    fn verify_and_parse_rejects_before_decoding() {
        let result = verifier().verify_and_parse(b"{not json", Some("00"));
        assert_eq!(result, Err(WebhookError::InvalidSignature));
    }

    #[test]
    fn verify_and_parse_requires_signature() {
        let result = verifier().verify_and_parse(BODY, None);
        assert_eq!(result, Err(WebhookError::MissingSignature));
    }

    #[test]
    fn verify_and_parse_accepts_signed_batch() {
        let signature = compute_signature(TEST_SECRET, BODY);
        let batch = verifier().verify_and_parse(BODY, Some(&signature)).unwrap();
        assert_eq!(batch.events[0].links.subscription.as_deref(), Some("SB123"));
    }
}
