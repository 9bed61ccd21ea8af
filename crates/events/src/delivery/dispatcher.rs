//! Forwards bus events to the configured notification webhook.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::webhook::WebhookDelivery;
use crate::bus::PlatformEvent;

/// Subscribes to the bus and delivers every event to one URL. Each event is
/// delivered on its own task so a slow endpoint's backoff does not hold up
/// the rest of the stream.
pub struct NotificationDispatcher {
    delivery: Arc<WebhookDelivery>,
    url: String,
}

impl NotificationDispatcher {
    pub fn new(delivery: WebhookDelivery, url: impl Into<String>) -> Self {
        Self { delivery: Arc::new(delivery), url: url.into() }
    }

    pub async fn run(
        self,
        mut receiver: broadcast::Receiver<PlatformEvent>,
        cancel: CancellationToken,
    ) {
        tracing::info!(url = %self.url, "Notification dispatcher started");
        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = receiver.recv() => received,
            };
            match received {
                Ok(event) => {
                    let delivery = self.delivery.clone();
                    let url = self.url.clone();
                    tokio::spawn(async move {
                        if let Err(e) = delivery.deliver(&url, &event).await {
                            tracing::error!(
                                event_type = %event.event_type,
                                error = %e,
                                "Notification not delivered"
                            );
                        }
                    });
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification dispatcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::info!("Notification dispatcher stopped");
    }
}
