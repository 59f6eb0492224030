use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::debug;

use crate::models::{StockSnapshot, STOCK_CACHE_TTL_SECS};

/// Read-through cache of stock snapshots, keyed `stock:{product}:{variant}`.
/// Every failure is logged at debug and swallowed: correctness always rests
/// on the database, never on this layer.
#[derive(Clone)]
pub struct StockCache {
    conn: ConnectionManager,
}

impl StockCache {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn key(product_id: &str, variant_id: Option<&str>) -> String {
        format!("stock:{}:{}", product_id, variant_id.unwrap_or(""))
    }

    pub async fn get(&self, product_id: &str, variant_id: Option<&str>) -> Option<StockSnapshot> {
        let key = Self::key(product_id, variant_id);
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    debug!(key, %err, "dropping undecodable stock cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                debug!(key, %err, "stock cache read failed");
                None
            }
        }
    }

    pub async fn put(&self, snapshot: &StockSnapshot) {
        let key = Self::key(&snapshot.product_id, snapshot.variant_id.as_deref());
        let raw = match serde_json::to_string(snapshot) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(key, %err, "stock snapshot did not serialize");
                return;
            }
        };
        let mut conn = self.conn.clone();
        if let Err(err) = conn
            .set_ex::<_, _, ()>(&key, raw, STOCK_CACHE_TTL_SECS)
            .await
        {
            debug!(key, %err, "stock cache write failed");
        }
    }

    pub async fn invalidate(&self, product_id: &str, variant_id: Option<&str>) {
        let key = Self::key(product_id, variant_id);
        let mut conn = self.conn.clone();
        if let Err(err) = conn.del::<_, ()>(&key).await {
            debug!(key, %err, "stock cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_collapses_missing_variant() {
        assert_eq!(StockCache::key("p1", None), "stock:p1:");
        assert_eq!(StockCache::key("p1", Some("")), "stock:p1:");
        assert_eq!(StockCache::key("p1", Some("red")), "stock:p1:red");
    }
}
