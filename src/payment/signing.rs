//! Request signing for the payment provider.
//!
//! Outbound invoice bodies are serialized deterministically (typed struct,
//! stable field order), base64-encoded, and signed with HMAC-SHA256 under
//! the merchant key. Inbound webhook bodies are verified with the same
//! primitive over the raw bytes, constant-time.

use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A signed, transport-ready payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// base64 of the canonical JSON body.
    pub encoded: String,
    /// Hex HMAC-SHA256 over `encoded`.
    pub signature: String,
}

/// Canonicalize, encode, and sign an outbound request body.
///
/// Serialization of the same logical body is byte-identical on every call:
/// serde emits struct fields in declaration order.
pub fn sign<T: Serialize>(body: &T, key: &str) -> Result<SignedPayload, serde_json::Error> {
    let canonical = serde_json::to_string(body)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(canonical.as_bytes());
    let signature = hmac_hex(key, encoded.as_bytes());
    Ok(SignedPayload { encoded, signature })
}

/// Verify a hex HMAC-SHA256 signature over raw bytes. Constant-time; any
/// malformed input verifies as false rather than erroring.
pub fn verify(key: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

fn hmac_hex(key: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Body {
        amount: String,
        currency: &'static str,
        order_id: String,
    }

    fn body() -> Body {
        Body {
            amount: "9.99".into(),
            currency: "USDT",
            order_id: "42_100_ab12".into(),
        }
    }

    #[test]
    fn signing_is_deterministic() {
        let a = sign(&body(), "merchant-key").unwrap();
        let b = sign(&body(), "merchant-key").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn encoded_decodes_to_canonical_json() {
        let signed = sign(&body(), "merchant-key").unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&signed.encoded)
            .unwrap();
        let canonical = String::from_utf8(decoded).unwrap();
        assert_eq!(
            canonical,
            r#"{"amount":"9.99","currency":"USDT","order_id":"42_100_ab12"}"#
        );
    }

    #[test]
    fn signature_depends_on_key() {
        let a = sign(&body(), "key-one").unwrap();
        let b = sign(&body(), "key-two").unwrap();
        assert_eq!(a.encoded, b.encoded);
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn verify_accepts_own_signature() {
        let signed = sign(&body(), "merchant-key").unwrap();
        assert!(verify(
            "merchant-key",
            signed.encoded.as_bytes(),
            &signed.signature
        ));
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let signed = sign(&body(), "merchant-key").unwrap();
        assert!(!verify(
            "merchant-key",
            b"tampered body",
            &signed.signature
        ));
    }

    #[test]
    fn verify_rejects_wrong_key_and_garbage() {
        let signed = sign(&body(), "merchant-key").unwrap();
        assert!(!verify(
            "other-key",
            signed.encoded.as_bytes(),
            &signed.signature
        ));
        assert!(!verify("merchant-key", b"x", "not-hex"));
        assert!(!verify("merchant-key", b"x", ""));
    }
}
