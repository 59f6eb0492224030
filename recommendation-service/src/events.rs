use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::warn;

use shared::{InteractionEvent, RECOMMENDATION_EVENTS_TOPIC};

/// Interaction events for downstream consumers. Emission never fails the
/// record that produced it; broker errors are logged and dropped.
#[derive(Clone)]
pub struct EventPublisher {
    producer: FutureProducer,
}

impl EventPublisher {
    pub fn new(producer: FutureProducer) -> Self {
        Self { producer }
    }

    pub async fn publish(&self, event: InteractionEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(err) => {
                warn!(%err, "interaction event did not serialize");
                return;
            }
        };
        let key = event.user_id.clone();
        let record = FutureRecord::to(RECOMMENDATION_EVENTS_TOPIC)
            .payload(&json)
            .key(&key);

        if let Err((err, _)) = self.producer.send(record, Duration::from_secs(5)).await {
            warn!(%err, user_id = %event.user_id, "failed to publish interaction event");
        }
    }
}
