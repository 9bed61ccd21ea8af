//! Webhook delivery with exponential-backoff retry.
//!
//! [`WebhookDelivery`] POSTs a JSON-encoded [`PlatformEvent`] to an external
//! URL. Failed attempts are retried with backoff (1 s, 2 s, 4 s by default).

use std::time::Duration;

use crate::bus::PlatformEvent;

const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// HTTP timeout for a single attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Network, DNS, timeout or client construction failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

pub struct WebhookDelivery {
    client: reqwest::Client,
    retry_delays: Vec<Duration>,
}

impl WebhookDelivery {
    pub fn new() -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, retry_delays: RETRY_DELAYS.to_vec() })
    }

    /// Override the backoff schedule.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Deliver one event, retrying after each configured delay. Returns the
    /// last error once every attempt failed.
    pub async fn deliver(&self, url: &str, event: &PlatformEvent) -> Result<(), WebhookError> {
        let payload = serde_json::json!({
            "event_type": event.event_type,
            "payload": event.payload,
            "timestamp": event.timestamp,
            "source_entity_type": event.source_entity_type,
            "source_entity_id": event.source_entity_id,
            "recipient_user_id": event.recipient_user_id,
        });

        let mut delays = self.retry_delays.iter();
        let mut attempt = 1;
        loop {
            match self.try_send(url, &payload).await {
                Ok(()) => return Ok(()),
                Err(e) => match delays.next() {
                    Some(delay) => {
                        tracing::warn!(attempt, url, error = %e, "Webhook delivery attempt failed, retrying");
                        tokio::time::sleep(*delay).await;
                        attempt += 1;
                    }
                    None => {
                        tracing::error!(url, attempts = attempt, error = %e, "Webhook delivery failed after all retries");
                        return Err(e);
                    }
                },
            }
        }
    }

    async fn try_send(&self, url: &str, payload: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;

    /// Local endpoint that fails the first `fail_first` requests.
    async fn serve(fail_first: usize) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/hook",
                post(
                    |State((hits, fail_first)): State<(Arc<AtomicUsize>, usize)>,
                     Json(body): Json<serde_json::Value>| async move {
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(body["event_type"], "order.paid");
                        if n < fail_first {
                            StatusCode::BAD_GATEWAY
                        } else {
                            StatusCode::NO_CONTENT
                        }
                    },
                ),
            )
            .with_state((hits.clone(), fail_first));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}/hook"), hits)
    }

    fn fast() -> WebhookDelivery {
        WebhookDelivery::new().unwrap().with_retry_delays(vec![Duration::ZERO; 3])
    }

    #[tokio::test]
    async fn retries_until_success() {
        let (url, hits) = serve(2).await;
        fast().deliver(&url, &PlatformEvent::new("order.paid")).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_all_attempts() {
        let (url, hits) = serve(usize::MAX).await;
        let err = fast().deliver(&url, &PlatformEvent::new("order.paid")).await.unwrap_err();
        assert!(matches!(err, WebhookError::HttpStatus(502)));
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn webhook_error_display_http_status() {
        assert_eq!(WebhookError::HttpStatus(502).to_string(), "Webhook returned HTTP 502");
    }
}
