use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const INVENTORY_EVENTS_TOPIC: &str = "inventory-events";
pub const RECOMMENDATION_EVENTS_TOPIC: &str = "recommendation-events";

/// One line of a reservation request: a (product, variant) pair and a
/// quantity. An absent variant and an empty-string variant address the same
/// stock row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationLine {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    pub quantity: i32,
}

impl ReservationLine {
    /// Variant as stored: the empty-string spelling collapses to `None`.
    pub fn variant(&self) -> Option<&str> {
        match self.variant_id.as_deref() {
            None | Some("") => None,
            Some(v) => Some(v),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockEvent {
    pub id: Uuid,
    pub kind: StockEventKind,
    pub order_id: Option<String>,
    pub lines: Vec<ReservationLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEventKind {
    Reserved,
    Committed,
    Released,
    Expired,
    Adjusted,
}

impl StockEvent {
    pub fn new(kind: StockEventKind, order_id: Option<String>, lines: Vec<ReservationLine>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            order_id,
            lines,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub id: Uuid,
    pub user_id: String,
    pub product_id: String,
    pub interaction_type: String,
    pub occurred_at: DateTime<Utc>,
}

impl InteractionEvent {
    pub fn new(user_id: String, product_id: String, interaction_type: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            product_id,
            interaction_type,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_normalizes_empty_string_to_none() {
        let mut line = ReservationLine {
            product_id: "p1".into(),
            variant_id: Some(String::new()),
            quantity: 1,
        };
        assert_eq!(line.variant(), None);

        line.variant_id = None;
        assert_eq!(line.variant(), None);

        line.variant_id = Some("red-xl".into());
        assert_eq!(line.variant(), Some("red-xl"));
    }

    #[test]
    fn stock_event_round_trips_through_json() {
        let event = StockEvent::new(
            StockEventKind::Reserved,
            Some("order-1".into()),
            vec![ReservationLine {
                product_id: "p1".into(),
                variant_id: None,
                quantity: 2,
            }],
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: StockEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, StockEventKind::Reserved);
        assert_eq!(back.order_id.as_deref(), Some("order-1"));
        assert_eq!(back.lines.len(), 1);
    }
}
