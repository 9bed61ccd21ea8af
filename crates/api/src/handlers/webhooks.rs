//! Handlers for payment provider webhooks.
//!
//! Each delivery is verified against the raw body, stored in the webhook
//! inbox and acknowledged. Reconciliation runs on a spawned task so the
//! provider gets its 200 as soon as the event is durable; anything that
//! fails there is retried by the inbox poller.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use beacon_core::models::Provider;
use beacon_core::signature;
use beacon_core::types::DbId;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

const STRIPE_SIGNATURE: &str = "stripe-signature";
const SHOPIFY_HMAC: &str = "x-shopify-hmac-sha256";
const SHOPIFY_TOPIC: &str = "x-shopify-topic";
const SHOPIFY_WEBHOOK_ID: &str = "x-shopify-webhook-id";

/// Acknowledgement returned to the provider.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}

/// POST /api/v1/webhooks/stripe
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::ServiceUnavailable("Stripe webhooks are not configured".into()))?;

    signature::verify_stripe(
        &body,
        header(&headers, STRIPE_SIGNATURE).unwrap_or_default(),
        secret,
        Utc::now().timestamp(),
        state.config.webhook_tolerance_secs,
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "Rejected Stripe webhook signature");
        AppError::BadRequest(format!("Invalid signature: {e}"))
    })?;

    let payload = parse_payload(&body)?;
    let event_id = payload
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest("Stripe event has no id".into()))?
        .to_string();
    let event_type = payload
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest("Stripe event has no type".into()))?
        .to_string();

    accept(&state, Provider::Stripe, &event_id, &event_type, payload).await
}

/// POST /api/v1/webhooks/shopify
pub async fn shopify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let secret = state
        .config
        .shopify_webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::ServiceUnavailable("Shopify webhooks are not configured".into()))?;

    signature::verify_shopify(&body, header(&headers, SHOPIFY_HMAC).unwrap_or_default(), secret)
        .map_err(|e| {
            tracing::warn!(error = %e, "Rejected Shopify webhook signature");
            AppError::BadRequest(format!("Invalid signature: {e}"))
        })?;

    let topic = header(&headers, SHOPIFY_TOPIC)
        .ok_or_else(|| AppError::BadRequest("Missing X-Shopify-Topic header".into()))?
        .to_string();
    let event_id = header(&headers, SHOPIFY_WEBHOOK_ID)
        .ok_or_else(|| AppError::BadRequest("Missing X-Shopify-Webhook-Id header".into()))?
        .to_string();
    let payload = parse_payload(&body)?;

    accept(&state, Provider::Shopify, &event_id, &topic, payload).await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_payload(body: &[u8]) -> AppResult<Value> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON payload: {e}")))
}

/// Store the verified event and hand it to the reconciler.
async fn accept(
    state: &AppState,
    provider: Provider,
    event_id: &str,
    event_type: &str,
    payload: Value,
) -> AppResult<Json<WebhookAck>> {
    let inserted = state
        .stores
        .inbox
        .enqueue(provider, event_id, event_type, &payload)
        .await
        .map_err(|e| {
            tracing::error!(provider = provider.as_str(), event_id, error = %e, "Failed to store webhook");
            AppError::ServiceUnavailable("Could not store webhook event".into())
        })?;

    let Some(inbox_id) = inserted else {
        tracing::info!(provider = provider.as_str(), event_id, "Duplicate webhook delivery");
        return Ok(Json(WebhookAck { received: true, duplicate: true }));
    };

    tracing::info!(provider = provider.as_str(), event_id, event_type, inbox_id, "Webhook queued");
    tokio::spawn(process(state.clone(), inbox_id));
    Ok(Json(WebhookAck { received: true, duplicate: false }))
}

async fn process(state: AppState, inbox_id: DbId) {
    let event = match state.stores.inbox.find(inbox_id).await {
        Ok(Some(event)) => event,
        Ok(None) => {
            tracing::error!(inbox_id, "Queued webhook vanished before processing");
            return;
        }
        Err(e) => {
            tracing::warn!(inbox_id, error = %e, "Could not load queued webhook; poller will retry");
            return;
        }
    };
    // Failures are logged and recorded on the inbox row by the reconciler.
    if let Ok(outcome) = state.reconciler.process_inbox_event(&event).await {
        tracing::debug!(inbox_id, outcome = outcome.label(), "Webhook processed");
    }
}
