use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::debug;

/// Cache of ranked product-id lists. Like every cache here, it is a hint:
/// failures are logged at debug and the caller falls through to Postgres.
#[derive(Clone)]
pub struct RecommendationCache {
    conn: ConnectionManager,
}

pub fn user_key(user_id: &str) -> String {
    format!("recommendation:user:{user_id}")
}

pub fn product_key(product_id: &str) -> String {
    format!("recommendation:product:{product_id}")
}

pub fn trending_key() -> String {
    "recommendation:trending".to_string()
}

impl RecommendationCache {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub async fn get_ids(&self, key: &str) -> Option<Vec<String>> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(ids) => Some(ids),
                Err(err) => {
                    debug!(key, %err, "dropping undecodable recommendation cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                debug!(key, %err, "recommendation cache read failed");
                None
            }
        }
    }

    pub async fn put_ids(&self, key: &str, ids: &[String], ttl_seconds: u64) {
        let raw = match serde_json::to_string(ids) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(key, %err, "recommendation list did not serialize");
                return;
            }
        };
        let mut conn = self.conn.clone();
        if let Err(err) = conn.set_ex::<_, _, ()>(key, raw, ttl_seconds).await {
            debug!(key, %err, "recommendation cache write failed");
        }
    }

    pub async fn invalidate(&self, key: &str) {
        let mut conn = self.conn.clone();
        if let Err(err) = conn.del::<_, ()>(key).await {
            debug!(key, %err, "recommendation cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_shared_naming_scheme() {
        assert_eq!(user_key("u1"), "recommendation:user:u1");
        assert_eq!(product_key("p1"), "recommendation:product:p1");
        assert_eq!(trending_key(), "recommendation:trending");
    }
}
