//! HMAC-SHA256 payload signing.
//!
//! The signature covers the raw payload bytes exactly as they are sent on
//! the wire; receivers verify by recomputing with their shared secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the HMAC-SHA256 signature for a webhook payload.
///
/// Returns the lowercase hex-encoded digest.
#[must_use]
pub fn compute_signature(secret: &str, payload: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded HMAC-SHA256 signature using constant-time comparison.
#[must_use]
pub fn verify_signature(expected_hex: &str, secret: &str, payload: &[u8]) -> bool {
    let computed = compute_signature(secret, payload);
    constant_time_eq(expected_hex.as_bytes(), computed.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_deterministic() {
        let sig1 = compute_signature("secret", b"payload");
        let sig2 = compute_signature("secret", b"payload");
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn test_signature_changes_with_different_secret() {
        let sig1 = compute_signature("secret1", b"payload");
        let sig2 = compute_signature("secret2", b"payload");
        assert_ne!(sig1, sig2);
    }

    #[test]
    fn test_signature_changes_with_different_payload() {
        let sig1 = compute_signature("secret", b"payload1");
        let sig2 = compute_signature("secret", b"payload2");
        assert_ne!(sig1, sig2);
    }

    #[test]
    fn test_signature_is_lowercase_hex() {
        let sig = compute_signature("secret", b"payload");
        // SHA256 = 32 bytes = 64 hex chars
        assert_eq!(sig.len(), 64);
        assert!(sig
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_verify_signature_valid() {
        let sig = compute_signature("my-secret", b"body");
        assert!(verify_signature(&sig, "my-secret", b"body"));
    }

    #[test]
    fn test_verify_signature_invalid() {
        assert!(!verify_signature("not-a-signature", "secret", b"payload"));
    }

    #[test]
    fn test_verify_signature_wrong_secret() {
        let sig = compute_signature("secret-a", b"body");
        assert!(!verify_signature(&sig, "secret-b", b"body"));
    }

    #[test]
    fn test_constant_time_eq_different_length() {
        assert!(!constant_time_eq(b"hello", b"hi"));
    }
}
