//! Payment-intent verification against the Stripe REST API.
//!
//! [`StripePaymentVerifier`] implements the core `PaymentVerifier` port with
//! [`reqwest`]. Deployments without `STRIPE_API_KEY` get
//! [`UnconfiguredVerifier`], which makes purchase scans answer "retry later"
//! instead of granting anything.

use std::time::Duration;

use async_trait::async_trait;
use beacon_core::error::{StoreError, StoreResult};
use beacon_core::models::VerifiedIntent;
use beacon_core::ports::PaymentVerifier;
use serde::Deserialize;

pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Subset of Stripe's PaymentIntent object.
#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    amount: i64,
    currency: String,
}

pub struct StripePaymentVerifier {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl StripePaymentVerifier {
    pub fn new(api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_base(STRIPE_API_BASE, api_key)
    }

    /// Point the verifier at another API host (test servers, mocks).
    pub fn with_base(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

/// Stripe ids are `pi_` followed by alphanumerics; anything else would be
/// spliced into the request path.
fn is_valid_intent_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 255 && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[async_trait]
impl PaymentVerifier for StripePaymentVerifier {
    async fn verify(&self, payment_intent_id: &str) -> StoreResult<Option<VerifiedIntent>> {
        if !is_valid_intent_id(payment_intent_id) {
            tracing::debug!(payment_intent_id, "Rejecting malformed payment intent id");
            return Ok(None);
        }

        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{payment_intent_id}", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout(REQUEST_TIMEOUT.as_millis() as u64)
                } else {
                    StoreError::Unavailable(format!("stripe request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            tracing::warn!(payment_intent_id, status = status.as_u16(), "Stripe rejected intent lookup");
            return Err(StoreError::Unavailable(format!("stripe returned {status}")));
        }

        let intent: PaymentIntent = response
            .json()
            .await
            .map_err(|e| StoreError::Integrity(format!("unreadable payment intent: {e}")))?;

        Ok(Some(VerifiedIntent {
            succeeded: intent.status == "succeeded",
            id: intent.id,
            amount_cents: intent.amount,
            currency: intent.currency,
        }))
    }
}

/// Verifier used when no payment provider key is configured.
pub struct UnconfiguredVerifier;

#[async_trait]
impl PaymentVerifier for UnconfiguredVerifier {
    async fn verify(&self, _payment_intent_id: &str) -> StoreResult<Option<VerifiedIntent>> {
        Err(StoreError::Unavailable("payment verification is not configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    async fn intent(
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk_test") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        match id.as_str() {
            "pi_paid" => Ok(Json(json!({
                "id": "pi_paid", "status": "succeeded", "amount": 2500, "currency": "gbp"
            }))),
            "pi_pending" => Ok(Json(json!({
                "id": "pi_pending", "status": "requires_payment_method", "amount": 900, "currency": "gbp"
            }))),
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn serve() -> String {
        let app = Router::new().route("/v1/payment_intents/{id}", get(intent));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn succeeded_intent_is_verified() {
        let verifier = StripePaymentVerifier::with_base(serve().await, "sk_test").unwrap();
        let intent = verifier.verify("pi_paid").await.unwrap().unwrap();
        assert!(intent.succeeded);
        assert_eq!(intent.amount_cents, 2500);
    }

    #[tokio::test]
    async fn unpaid_and_unknown_intents() {
        let verifier = StripePaymentVerifier::with_base(serve().await, "sk_test").unwrap();
        let pending = verifier.verify("pi_pending").await.unwrap().unwrap();
        assert!(!pending.succeeded);
        assert_eq!(verifier.verify("pi_missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_id_never_reaches_the_provider() {
        let verifier = StripePaymentVerifier::with_base("http://127.0.0.1:9", "sk_test").unwrap();
        assert_eq!(verifier.verify("../v1/charges").await.unwrap(), None);
    }

    #[tokio::test]
    async fn bad_key_is_a_transient_failure() {
        let verifier = StripePaymentVerifier::with_base(serve().await, "sk_wrong").unwrap();
        assert_matches!(verifier.verify("pi_paid").await, Err(StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unconfigured_verifier_is_unavailable() {
        assert_matches!(UnconfiguredVerifier.verify("pi_paid").await, Err(StoreError::Unavailable(_)));
    }
}
