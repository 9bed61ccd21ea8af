//! Payment provider webhook signature verification.
//!
//! - Stripe: `Stripe-Signature: t=<unix>,v1=<hex hmac>[,v1=...]` where the MAC
//!   covers `"{t}.{raw body}"`. The timestamp must be within the tolerance
//!   window to stop replays of captured requests.
//! - Shopify: `X-Shopify-Hmac-Sha256: <base64 hmac of raw body>`.
//!
//! Comparisons go through [`Mac::verify_slice`], which is constant time.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default accepted clock skew for Stripe signatures.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature header is missing or empty")]
    Missing,

    #[error("Signature header is malformed: {0}")]
    Malformed(&'static str),

    #[error("Signature timestamp is outside the tolerance window")]
    Stale,

    #[error("Signature does not match payload")]
    Mismatch,
}

fn mac(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length; new_from_slice cannot fail here.
    HmacSha256::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| unreachable!())
}

/// Verify a Stripe webhook signature header against the raw request body.
pub fn verify_stripe(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    if header.trim().is_empty() {
        return Err(SignatureError::Missing);
    }

    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(SignatureError::Malformed("expected key=value pairs"));
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse()
                        .map_err(|_| SignatureError::Malformed("timestamp is not an integer"))?,
                );
            }
            // Undecodable v1 values simply never match.
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed("missing t="))?;
    if !header.contains("v1=") {
        return Err(SignatureError::Malformed("missing v1="));
    }
    // `t=` is attacker-controlled; abs_diff cannot overflow.
    if now_unix.abs_diff(timestamp) > tolerance_secs.max(0) as u64 {
        return Err(SignatureError::Stale);
    }

    let mut base = mac(secret);
    base.update(timestamp.to_string().as_bytes());
    base.update(b".");
    base.update(payload);

    let matched = candidates
        .iter()
        .any(|candidate| base.clone().verify_slice(candidate).is_ok());
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Verify a Shopify `X-Shopify-Hmac-Sha256` header against the raw body.
pub fn verify_shopify(payload: &[u8], header: &str, secret: &str) -> Result<(), SignatureError> {
    let header = header.trim();
    if header.is_empty() {
        return Err(SignatureError::Missing);
    }
    let expected = base64::engine::general_purpose::STANDARD
        .decode(header)
        .map_err(|_| SignatureError::Malformed("not base64"))?;

    let mut m = mac(secret);
    m.update(payload);
    m.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

/// Produce a Stripe-format signature header. Used by tests and tooling.
pub fn sign_stripe(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut m = mac(secret);
    m.update(timestamp.to_string().as_bytes());
    m.update(b".");
    m.update(payload);
    format!("t={timestamp},v1={}", hex::encode(m.finalize().into_bytes()))
}

/// Produce a Shopify-format signature header. Used by tests and tooling.
pub fn sign_shopify(payload: &[u8], secret: &str) -> String {
    let mut m = mac(secret);
    m.update(payload);
    base64::engine::general_purpose::STANDARD.encode(m.finalize().into_bytes())
}
