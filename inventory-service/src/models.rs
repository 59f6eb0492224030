use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_RESERVATION_TTL_SECS: i64 = 15 * 60;
pub const MIN_RESERVATION_TTL_SECS: i64 = 60;
pub const MAX_RESERVATION_TTL_SECS: i64 = 60 * 60;

pub const STOCK_CACHE_TTL_SECS: u64 = 5 * 60;
pub const LOW_STOCK_THRESHOLD: i32 = 10;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::stocks)]
pub struct Stock {
    pub id: Uuid,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub total: i32,
    pub reserved: i32,
    pub available: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::stocks)]
pub struct NewStock {
    pub id: Uuid,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub total: i32,
    pub reserved: i32,
    pub available: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::reservations)]
pub struct Reservation {
    pub id: Uuid,
    pub order_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i32,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct NewReservation {
    pub id: Uuid,
    pub order_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i32,
    pub status: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = crate::schema::stock_movements)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub quantity: i32,
    pub operation: String,
    pub reason: String,
    pub previous_qty: i32,
    pub new_qty: i32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::stock_movements)]
pub struct NewStockMovement {
    pub id: Uuid,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub quantity: i32,
    pub operation: String,
    pub reason: String,
    pub previous_qty: i32,
    pub new_qty: i32,
    pub created_by: Option<String>,
}

/// Lifecycle of a hold. Once a reservation leaves `Pending` it never goes
/// back; the three terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Committed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Committed => "COMMITTED",
            ReservationStatus::Released => "RELEASED",
            ReservationStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ReservationStatus::Pending),
            "COMMITTED" => Some(ReservationStatus::Committed),
            "RELEASED" => Some(ReservationStatus::Released),
            "EXPIRED" => Some(ReservationStatus::Expired),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (
                ReservationStatus::Pending,
                ReservationStatus::Committed
                    | ReservationStatus::Released
                    | ReservationStatus::Expired
            )
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StockOperation {
    Add,
    Subtract,
    Set,
}

impl StockOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockOperation::Add => "ADD",
            StockOperation::Subtract => "SUBTRACT",
            StockOperation::Set => "SET",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADD" => Some(StockOperation::Add),
            "SUBTRACT" => Some(StockOperation::Subtract),
            "SET" => Some(StockOperation::Set),
            _ => None,
        }
    }
}

/// The read model handed to callers and cached in Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub total: i32,
    pub reserved: i32,
    pub available: i32,
    pub low_stock: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&Stock> for StockSnapshot {
    fn from(stock: &Stock) -> Self {
        StockSnapshot {
            product_id: stock.product_id.clone(),
            variant_id: stock.variant_id.clone(),
            warehouse_id: stock.warehouse_id.clone(),
            total: stock.total,
            reserved: stock.reserved,
            available: stock.available,
            low_stock: stock.available < LOW_STOCK_THRESHOLD,
            updated_at: stock.updated_at,
        }
    }
}

/// Per-line outcome of a reserve call. On failure the list covers the lines
/// processed up to and including the one that failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineResult {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub reserved: bool,
    pub available_quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Clamp a requested reservation TTL into the allowed window. Zero and
/// negative requests fall back to the default before clamping.
pub fn clamp_ttl_seconds(requested: i64) -> i64 {
    let ttl = if requested <= 0 {
        DEFAULT_RESERVATION_TTL_SECS
    } else {
        requested
    };
    ttl.clamp(MIN_RESERVATION_TTL_SECS, MAX_RESERVATION_TTL_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_clamps_into_bounds() {
        assert_eq!(clamp_ttl_seconds(0), DEFAULT_RESERVATION_TTL_SECS);
        assert_eq!(clamp_ttl_seconds(-5), DEFAULT_RESERVATION_TTL_SECS);
        assert_eq!(clamp_ttl_seconds(1), MIN_RESERVATION_TTL_SECS);
        assert_eq!(clamp_ttl_seconds(30), MIN_RESERVATION_TTL_SECS);
        assert_eq!(clamp_ttl_seconds(900), 900);
        assert_eq!(clamp_ttl_seconds(100_000), MAX_RESERVATION_TTL_SECS);
    }

    #[test]
    fn status_transitions_only_leave_pending() {
        use ReservationStatus::*;

        for next in [Committed, Released, Expired] {
            assert!(Pending.can_transition_to(next));
        }
        assert!(!Pending.can_transition_to(Pending));
        for from in [Committed, Released, Expired] {
            for next in [Pending, Committed, Released, Expired] {
                assert!(!from.can_transition_to(next));
            }
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Committed,
            ReservationStatus::Released,
            ReservationStatus::Expired,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::parse("pending"), None);
    }

    #[test]
    fn operation_parse_rejects_unknown() {
        assert_eq!(StockOperation::parse("ADD"), Some(StockOperation::Add));
        assert_eq!(
            StockOperation::parse("SUBTRACT"),
            Some(StockOperation::Subtract)
        );
        assert_eq!(StockOperation::parse("SET"), Some(StockOperation::Set));
        assert_eq!(StockOperation::parse("add"), None);
        assert_eq!(StockOperation::parse("DELETE"), None);
    }

    #[test]
    fn line_result_omits_error_on_success() {
        let ok = LineResult {
            product_id: "p1".into(),
            variant_id: None,
            reserved: true,
            available_quantity: 7,
            error: None,
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("error").is_none());

        let failed = LineResult {
            error: Some("insufficient stock".into()),
            reserved: false,
            ..ok
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"], "insufficient stock");
    }

    #[test]
    fn snapshot_flags_low_stock() {
        let now = Utc::now();
        let stock = Stock {
            id: Uuid::new_v4(),
            product_id: "p1".into(),
            variant_id: None,
            warehouse_id: None,
            total: 12,
            reserved: 4,
            available: 8,
            created_at: now,
            updated_at: now,
        };
        let snapshot = StockSnapshot::from(&stock);
        assert!(snapshot.low_stock);
        assert_eq!(snapshot.available + snapshot.reserved, snapshot.total);
    }
}
