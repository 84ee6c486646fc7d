//! Fire-and-forget order event publishing.

use crate::domain::events::OrderEvent;

/// Publishes order events to NATS when a client is configured. Delivery
/// failures are logged and never fail the request that produced them.
#[derive(Clone, Default)]
pub struct Notifier {
    client: Option<async_nats::Client>,
}

impl Notifier {
    pub fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub async fn publish(&self, event: &OrderEvent) {
        let Some(client) = &self.client else {
            return;
        };
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode order event");
                return;
            }
        };
        if let Err(e) = client
            .publish(event.subject().to_string(), payload.into())
            .await
        {
            tracing::warn!(error = %e, subject = event.subject(), "failed to publish order event");
        }
    }
}
