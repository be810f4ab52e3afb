//! Order reference tokens.
//!
//! The payment provider round-trips one opaque string per invoice. We pack
//! `(account_id, credits, nonce)` into `"{id}_{credits}_{nonce}"` so the
//! webhook can recover who to credit and by how much without server-side
//! order state. The nonce keeps concurrent invoices for the same account
//! and package from colliding on the provider's order-id uniqueness check.

use rand::Rng;
use thiserror::Error;

/// Separator between token segments. Account ids must not contain it —
/// a separator inside the id would make decoding ambiguous.
const SEPARATOR: char = '_';

/// Nonce entropy in bytes (hex-encoded in the token).
const NONCE_BYTES: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("account id may not contain '{SEPARATOR}': {0:?}")]
    SeparatorInAccountId(String),

    #[error("credit amount must be positive")]
    ZeroCredits,

    #[error("malformed order token: {0:?}")]
    Malformed(String),
}

/// A decoded order reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReference {
    pub account_id: String,
    pub credits: u32,
}

/// Encode an order token with a fresh random nonce.
pub fn encode(account_id: &str, credits: u32) -> Result<String, OrderError> {
    if account_id.is_empty() || account_id.contains(SEPARATOR) {
        return Err(OrderError::SeparatorInAccountId(account_id.to_string()));
    }
    if credits == 0 {
        return Err(OrderError::ZeroCredits);
    }

    let mut nonce = [0u8; NONCE_BYTES];
    rand::rng().fill_bytes(&mut nonce);
    Ok(format!(
        "{account_id}{SEPARATOR}{credits}{SEPARATOR}{}",
        hex::encode(nonce)
    ))
}

/// Decode an order token: first segment is the account id, second the
/// credit amount, trailing nonce segments are ignored.
pub fn decode(token: &str) -> Result<OrderReference, OrderError> {
    let mut parts = token.split(SEPARATOR);
    let account_id = parts
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| OrderError::Malformed(token.to_string()))?;
    let credits = parts
        .next()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|credits| *credits > 0)
        .ok_or_else(|| OrderError::Malformed(token.to_string()))?;

    Ok(OrderReference {
        account_id: account_id.to_string(),
        credits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let token = encode("42", 10).unwrap();
        let decoded = decode(&token).unwrap();
        assert_eq!(decoded.account_id, "42");
        assert_eq!(decoded.credits, 10);
    }

    #[test]
    fn nonce_varies_between_calls() {
        let a = encode("42", 10).unwrap();
        let b = encode("42", 10).unwrap();
        // 2 bytes of entropy: a collision is possible but a fixed value is a bug.
        let tries: Vec<String> = (0..16).map(|_| encode("42", 10).unwrap()).collect();
        assert!(a != b || tries.iter().any(|t| *t != a));
    }

    #[test]
    fn encode_rejects_separator_in_id() {
        assert_eq!(
            encode("bad_id", 10),
            Err(OrderError::SeparatorInAccountId("bad_id".into()))
        );
    }

    #[test]
    fn encode_rejects_empty_id_and_zero_credits() {
        assert!(matches!(
            encode("", 10),
            Err(OrderError::SeparatorInAccountId(_))
        ));
        assert_eq!(encode("42", 0), Err(OrderError::ZeroCredits));
    }

    #[test]
    fn decode_ignores_trailing_segments() {
        let decoded = decode("42_10_ab_cd_ef").unwrap();
        assert_eq!(decoded.account_id, "42");
        assert_eq!(decoded.credits, 10);
    }

    #[test]
    fn decode_rejects_missing_amount() {
        assert!(matches!(decode("42"), Err(OrderError::Malformed(_))));
        assert!(matches!(decode(""), Err(OrderError::Malformed(_))));
    }

    #[test]
    fn decode_rejects_bad_amount() {
        assert!(matches!(decode("42_ten_ff"), Err(OrderError::Malformed(_))));
        assert!(matches!(decode("42_0_ff"), Err(OrderError::Malformed(_))));
        assert!(matches!(decode("42_-5_ff"), Err(OrderError::Malformed(_))));
    }
}
