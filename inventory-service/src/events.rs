use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::warn;

use shared::{StockEvent, INVENTORY_EVENTS_TOPIC};

/// Fire-and-forget event emission. A broker hiccup must never fail the
/// stock operation that produced the event, so errors are logged and
/// dropped.
#[derive(Clone)]
pub struct EventPublisher {
    producer: FutureProducer,
}

impl EventPublisher {
    pub fn new(producer: FutureProducer) -> Self {
        Self { producer }
    }

    pub async fn publish(&self, event: StockEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(err) => {
                warn!(%err, "stock event did not serialize");
                return;
            }
        };
        let key = event.id.to_string();
        let record = FutureRecord::to(INVENTORY_EVENTS_TOPIC)
            .payload(&json)
            .key(&key);

        if let Err((err, _)) = self.producer.send(record, Duration::from_secs(5)).await {
            warn!(%err, kind = ?event.kind, "failed to publish stock event");
        }
    }
}
