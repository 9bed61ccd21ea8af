//! Short-lived signed scan links.
//!
//! A link `/l/{code}?exp=<unix>&sig=<hex>` carries
//! `sig = HMAC-SHA256(secret, "{code}.{exp}")`. A valid, unexpired signature
//! is recorded on the scan event so audits can tell static codes from
//! links minted for a single night.

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::beacon::Unavailable;
use crate::types::Timestamp;

type HmacSha256 = Hmac<Sha256>;

/// Upper bound on link lifetime an operator may request.
pub const MAX_TTL_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("Signed link has expired")]
    Expired,
    #[error("Signed link signature is invalid")]
    Invalid,
}

impl From<LinkError> for Unavailable {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Expired => Unavailable::LinkExpired,
            LinkError::Invalid => Unavailable::LinkInvalid,
        }
    }
}

/// Verified link claims, stored as the scan event's signed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedLink {
    pub code: String,
    pub expires_at: i64,
}

fn mac(secret: &str, code: &str, expires_at: i64) -> HmacSha256 {
    let mut m = HmacSha256::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| unreachable!());
    m.update(code.as_bytes());
    m.update(b".");
    m.update(expires_at.to_string().as_bytes());
    m
}

/// Sign a link for `code` expiring at `expires_at` (unix seconds).
pub fn sign(code: &str, expires_at: i64, secret: &str) -> String {
    hex::encode(mac(secret, code, expires_at).finalize().into_bytes())
}

/// Verify a link signature. Signature is checked before expiry so a forged
/// link never learns whether its timestamp would have been accepted.
pub fn verify(
    code: &str,
    expires_at: i64,
    sig: &str,
    secret: &str,
    now: Timestamp,
) -> Result<SignedLink, LinkError> {
    let bytes = hex::decode(sig).map_err(|_| LinkError::Invalid)?;
    mac(secret, code, expires_at)
        .verify_slice(&bytes)
        .map_err(|_| LinkError::Invalid)?;
    if now.timestamp() >= expires_at {
        return Err(LinkError::Expired);
    }
    Ok(SignedLink { code: code.to_string(), expires_at })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    const SECRET: &str = "link-secret";

    #[test]
    fn valid_link_verifies() {
        let exp = (Utc::now() + Duration::minutes(10)).timestamp();
        let sig = sign("NIGHT42", exp, SECRET);
        let link = verify("NIGHT42", exp, &sig, SECRET, Utc::now()).unwrap();
        assert_eq!(link.code, "NIGHT42");
        assert_eq!(link.expires_at, exp);
    }

    #[test]
    fn expired_link_is_rejected() {
        let exp = (Utc::now() - Duration::minutes(1)).timestamp();
        let sig = sign("NIGHT42", exp, SECRET);
        assert_eq!(verify("NIGHT42", exp, &sig, SECRET, Utc::now()), Err(LinkError::Expired));
    }

    #[test]
    fn signature_is_bound_to_code_and_expiry() {
        let exp = (Utc::now() + Duration::minutes(10)).timestamp();
        let sig = sign("NIGHT42", exp, SECRET);
        assert_eq!(verify("NIGHT43", exp, &sig, SECRET, Utc::now()), Err(LinkError::Invalid));
        assert_eq!(verify("NIGHT42", exp + 60, &sig, SECRET, Utc::now()), Err(LinkError::Invalid));
        assert_eq!(verify("NIGHT42", exp, "zz", SECRET, Utc::now()), Err(LinkError::Invalid));
    }

    #[test]
    fn maps_to_unavailable_reason() {
        assert_eq!(Unavailable::from(LinkError::Expired), Unavailable::LinkExpired);
        assert_eq!(Unavailable::from(LinkError::Invalid), Unavailable::LinkInvalid);
    }
}
