use hmac::{digest::KeyInit, Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// `HashIdentifier(s)`: SHA-256 hex, used for `client_id`, `client_secret`,
/// and refresh-token `token_id`.
pub fn hash_identifier(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// `SignHMAC(secretHash, canonicalPayload)`: SHA-256 hex HMAC over the
/// canonical payload, keyed by the **hash** of the shared secret (never the
/// raw secret) — the single convention this crate fixes on, resolving the
/// spec's flagged signer/verifier ambiguity (§9 Open Questions, §4.2).
pub fn sign_hmac(secret_hash: &str, canonical_payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret_hash.as_bytes())
        .expect("HMAC-SHA-256 accepts any key length");
    mac.update(canonical_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time signature comparison. Never short-circuits on length
/// mismatch: both sides are hashed to a fixed-width digest first so
/// `ConstantTimeEq` always compares equal-length buffers.
pub fn verify_hmac(secret_hash: &str, canonical_payload: &str, signature: &str) -> bool {
    let expected = sign_hmac(secret_hash, canonical_payload);

    let mut expected_digest = Sha256::new();
    expected_digest.update(expected.as_bytes());
    let expected_digest = expected_digest.finalize();

    let mut actual_digest = Sha256::new();
    actual_digest.update(signature.as_bytes());
    let actual_digest = actual_digest.finalize();

    expected_digest.ct_eq(&actual_digest).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::canonical_payload;
    use serde_json::json;

    #[test]
    fn identical_requests_sign_identically() {
        let secret_hash = hash_identifier("sk_test_secret");
        let body = json!({"email": "a@acme.io"});
        let payload = canonical_payload("POST", "/v1/auth/login", "1000", &body);

        let a = sign_hmac(&secret_hash, &payload);
        let b = sign_hmac(&secret_hash, &payload);
        assert_eq!(a, b);
        assert!(verify_hmac(&secret_hash, &payload, &a));
    }

    #[test]
    fn altering_any_byte_of_payload_falsifies_verification() {
        let secret_hash = hash_identifier("sk_test_secret");
        let body = json!({"email": "a@acme.io"});
        let payload = canonical_payload("POST", "/v1/auth/login", "1000", &body);
        let signature = sign_hmac(&secret_hash, &payload);

        let mutated = canonical_payload("POST", "/v1/auth/login", "1001", &body);
        assert!(!verify_hmac(&secret_hash, &mutated, &signature));
    }

    #[test]
    fn signature_of_different_length_never_short_circuits() {
        let secret_hash = hash_identifier("sk_test_secret");
        assert!(!verify_hmac(&secret_hash, "payload", "short"));
    }
}
