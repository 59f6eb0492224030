use chrono::Utc;
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{self, RecommendationCache};
use crate::error::{RecommendationError, Result};
use crate::events::EventPublisher;
use crate::interactions;
use crate::models::*;
use crate::schema::user_recommendations;
use crate::similarity;
use crate::trending;
use shared::InteractionEvent;

type DbPool = Pool<AsyncPgConnection>;

/// Score accumulator that remembers first-insertion order, so equal scores
/// rank in the order their candidates first appeared.
#[derive(Debug, Default)]
pub struct ScoreBoard {
    order: Vec<String>,
    scores: HashMap<String, f64>,
}

impl ScoreBoard {
    pub fn add(&mut self, id: &str, delta: f64) {
        if !self.scores.contains_key(id) {
            self.order.push(id.to_string());
        }
        *self.scores.entry(id.to_string()).or_insert(0.0) += delta;
    }

    /// Candidates best-first; ties keep first-insertion order.
    pub fn into_ranked(self, limit: usize) -> Vec<(String, f64)> {
        let ScoreBoard { mut order, scores } = self;
        order.sort_by(|a, b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
            .into_iter()
            .take(limit)
            .map(|id| {
                let score = scores[&id];
                (id, score)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Alternate between two ranked lists, skipping duplicates, until `limit`
/// entries are collected. The first list contributes first at each step.
pub fn interleave(
    first: &[(String, f64)],
    second: &[(String, f64)],
    limit: usize,
) -> Vec<(String, f64)> {
    let mut seen = HashSet::new();
    let mut combined = Vec::new();
    let longest = first.len().max(second.len());

    for i in 0..longest {
        if combined.len() >= limit {
            break;
        }
        if let Some((id, score)) = first.get(i) {
            if seen.insert(id.clone()) {
                combined.push((id.clone(), *score));
            }
        }
        if combined.len() >= limit {
            break;
        }
        if let Some((id, score)) = second.get(i) {
            if seen.insert(id.clone()) {
                combined.push((id.clone(), *score));
            }
        }
    }

    combined
}

/// Serves per-user and per-product recommendations from the interaction
/// log, the similarity matrix, and the trending index, with cache-through
/// reads.
#[derive(Clone)]
pub struct RecommendationService {
    pool: DbPool,
    cache: RecommendationCache,
    events: EventPublisher,
}

impl RecommendationService {
    pub fn new(pool: DbPool, cache: RecommendationCache, events: EventPublisher) -> Self {
        Self {
            pool,
            cache,
            events,
        }
    }

    /// Record an interaction and kick off the asynchronous trending-counter
    /// bump. Neither the counter update nor event emission can fail the
    /// record.
    pub async fn record_interaction(
        &self,
        user_id: &str,
        product_id: &str,
        interaction_type: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let kind = InteractionType::parse(interaction_type).ok_or_else(|| {
            RecommendationError::InvalidArgument(format!(
                "invalid interaction type: {interaction_type}"
            ))
        })?;

        let mut conn = self.pool.get().await?;
        interactions::record(&mut conn, user_id, product_id, kind, metadata).await?;
        drop(conn);

        let pool = self.pool.clone();
        let cache = self.cache.clone();
        let product = product_id.to_string();
        tokio::spawn(async move {
            match pool.get().await {
                Ok(mut conn) => {
                    if let Err(err) = trending::increment_counter(&mut conn, &product, kind).await
                    {
                        warn!(%err, product, "trending counter update failed");
                    }
                }
                Err(err) => warn!(%err, "no connection for trending counter update"),
            }
            cache.invalidate(&cache::trending_key()).await;
        });

        self.events
            .publish(InteractionEvent::new(
                user_id.to_string(),
                product_id.to_string(),
                kind.as_str().to_string(),
            ))
            .await;

        Ok(())
    }

    /// Per-user recommendations. Users with fewer than three interactions
    /// get the trending list whatever algorithm they asked for.
    pub async fn user_recommendations(
        &self,
        user_id: &str,
        limit: i64,
        algorithm: &str,
    ) -> Result<Vec<String>> {
        let algorithm = Algorithm::parse(algorithm)
            .ok_or_else(|| RecommendationError::InvalidAlgorithm(algorithm.to_string()))?;
        let limit = clamp_limit(limit) as usize;

        let key = cache::user_key(user_id);
        if let Some(mut ids) = self.cache.get_ids(&key).await {
            ids.truncate(limit);
            return Ok(ids);
        }

        let mut conn = self.pool.get().await?;

        let count = interactions::count_for_user(&mut conn, user_id).await?;
        if count < MIN_INTERACTIONS_FOR_RECOMMENDATION {
            drop(conn);
            return self.trending_products(limit as i64).await;
        }

        let scored = match algorithm {
            Algorithm::Trending => {
                drop(conn);
                return self.trending_products(limit as i64).await;
            }
            Algorithm::CollaborativeFiltering => {
                self.collaborative_filtering(&mut conn, user_id, limit).await?
            }
            Algorithm::ContentBased => self.content_based(&mut conn, user_id, limit).await?,
            Algorithm::Hybrid | Algorithm::Personalized => {
                let cf = self
                    .collaborative_filtering(&mut conn, user_id, limit)
                    .await?;
                let cb = self.content_based(&mut conn, user_id, limit).await?;
                interleave(&cf, &cb, limit)
            }
        };

        if !scored.is_empty() {
            persist_recommendations(&mut conn, user_id, algorithm, &scored).await?;
        }

        let ids: Vec<String> = scored.into_iter().map(|(id, _)| id).collect();
        if !ids.is_empty() {
            self.cache
                .put_ids(&key, &ids, USER_RECOMMENDATIONS_CACHE_TTL_SECS)
                .await;
        }

        info!(
            user_id,
            algorithm = algorithm.as_str(),
            count = ids.len(),
            "served user recommendations"
        );
        Ok(ids)
    }

    /// User-based collaborative filtering: weigh co-users by how much of
    /// the user's catalog they share, then pool their other products.
    async fn collaborative_filtering(
        &self,
        conn: &mut AsyncPgConnection,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>> {
        let user_products = interactions::products_for_user(conn, user_id).await?;
        if user_products.is_empty() {
            return Ok(Vec::new());
        }
        let touched: HashSet<&String> = user_products.iter().collect();

        let mut co_users = ScoreBoard::default();
        for product_id in &user_products {
            for other in interactions::users_for_product(conn, product_id).await? {
                if other != user_id {
                    co_users.add(&other, 1.0);
                }
            }
        }
        if co_users.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates = ScoreBoard::default();
        for (co_user, co_touches) in co_users.into_ranked(usize::MAX) {
            let overlap = co_touches / user_products.len() as f64;
            for product_id in interactions::products_for_user(conn, &co_user).await? {
                if !touched.contains(&product_id) {
                    candidates.add(&product_id, overlap);
                }
            }
        }

        Ok(candidates.into_ranked(limit))
    }

    /// Item-based filtering: walk the user's recent interactions and pull
    /// similar products out of the matrix, weighted by interaction strength.
    async fn content_based(
        &self,
        conn: &mut AsyncPgConnection,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>> {
        let recent =
            interactions::for_user(conn, user_id, RECENT_INTERACTIONS_FOR_ITEM_BASED).await?;
        if recent.is_empty() {
            return Ok(Vec::new());
        }

        let touched = interactions::weights_for_user(conn, user_id).await?;

        let mut candidates = ScoreBoard::default();
        for interaction in &recent {
            let similar = similarity::similar_products(
                conn,
                &interaction.product_id,
                DEFAULT_RECOMMENDATIONS,
                SIMILARITY_THRESHOLD,
            )
            .await?;
            for (product_id, score) in similar {
                if !touched.contains_key(&product_id) {
                    candidates.add(&product_id, score * interaction.weight);
                }
            }
        }

        Ok(candidates.into_ranked(limit))
    }

    /// Counterpart products of the similarity pairs containing the given
    /// product, best first.
    pub async fn product_recommendations(
        &self,
        product_id: &str,
        limit: i64,
    ) -> Result<Vec<String>> {
        let limit = clamp_limit(limit);

        let key = cache::product_key(product_id);
        if let Some(mut ids) = self.cache.get_ids(&key).await {
            ids.truncate(limit as usize);
            return Ok(ids);
        }

        let mut conn = self.pool.get().await?;
        let ids: Vec<String> =
            similarity::similar_products(&mut conn, product_id, limit, SIMILARITY_THRESHOLD)
                .await?
                .into_iter()
                .map(|(id, _)| id)
                .collect();

        if !ids.is_empty() {
            self.cache
                .put_ids(&key, &ids, PRODUCT_RECOMMENDATIONS_CACHE_TTL_SECS)
                .await;
        }
        Ok(ids)
    }

    pub async fn trending_products(&self, limit: i64) -> Result<Vec<String>> {
        let limit = clamp_trending_limit(limit);

        let key = cache::trending_key();
        if let Some(mut ids) = self.cache.get_ids(&key).await {
            ids.truncate(limit as usize);
            return Ok(ids);
        }

        let mut conn = self.pool.get().await?;
        let ids: Vec<String> = trending::top(&mut conn, limit, TRENDING_MIN_SCORE)
            .await?
            .into_iter()
            .map(|product| product.product_id)
            .collect();

        if !ids.is_empty() {
            self.cache.put_ids(&key, &ids, TRENDING_CACHE_TTL_SECS).await;
        }
        Ok(ids)
    }

    pub async fn recalculate_similarities(&self) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        similarity::recalculate(&mut conn).await
    }

    pub async fn recalculate_trending(&self) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let written = trending::recalculate(&mut conn).await?;
        self.cache.invalidate(&cache::trending_key()).await;
        Ok(written)
    }

    pub async fn prune_interactions(&self, retention_days: i64) -> Result<usize> {
        if retention_days <= 0 {
            return Ok(0);
        }
        let mut conn = self.pool.get().await?;
        let before = Utc::now() - chrono::Duration::days(retention_days);
        interactions::delete_older_than(&mut conn, before).await
    }
}

/// Replace the stored list for (user, algorithm) wholesale.
async fn persist_recommendations(
    conn: &mut AsyncPgConnection,
    user_id: &str,
    algorithm: Algorithm,
    scored: &[(String, f64)],
) -> Result<()> {
    let user_id = user_id.to_string();
    let generated_at = Utc::now();
    let rows: Vec<NewUserRecommendation> = scored
        .iter()
        .enumerate()
        .map(|(index, (product_id, score))| NewUserRecommendation {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            product_id: product_id.clone(),
            algorithm: algorithm.as_str().to_string(),
            rank: index as i32 + 1,
            score: *score,
            generated_at,
        })
        .collect();

    conn.transaction::<(), RecommendationError, _>(|conn| {
        async move {
            diesel::delete(
                user_recommendations::table
                    .filter(user_recommendations::user_id.eq(&user_id))
                    .filter(user_recommendations::algorithm.eq(algorithm.as_str())),
            )
            .execute(conn)
            .await?;

            diesel::insert_into(user_recommendations::table)
                .values(&rows)
                .execute(conn)
                .await?;

            Ok(())
        }
        .scope_boxed()
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(entries: &[(&str, f64)]) -> Vec<(String, f64)> {
        entries
            .iter()
            .map(|(id, score)| (id.to_string(), *score))
            .collect()
    }

    #[test]
    fn scoreboard_ranks_by_score_then_insertion() {
        let mut board = ScoreBoard::default();
        board.add("a", 1.0);
        board.add("b", 2.0);
        board.add("c", 1.0);
        board.add("a", 0.5);

        let ranked = board.into_ranked(10);
        assert_eq!(
            ranked,
            scored(&[("b", 2.0), ("a", 1.5), ("c", 1.0)])
        );
    }

    #[test]
    fn scoreboard_ties_keep_first_seen_order() {
        let mut board = ScoreBoard::default();
        board.add("z", 1.0);
        board.add("a", 1.0);
        board.add("m", 1.0);

        let ranked = board.into_ranked(10);
        let ids: Vec<&str> = ranked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn scoreboard_truncates_to_limit() {
        let mut board = ScoreBoard::default();
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            board.add(id, (4 - i) as f64);
        }
        assert_eq!(board.into_ranked(2), scored(&[("a", 4.0), ("b", 3.0)]));
    }

    #[test]
    fn interleave_alternates_and_dedups() {
        let first = scored(&[("a", 3.0), ("b", 2.0), ("c", 1.0)]);
        let second = scored(&[("x", 3.0), ("a", 2.5), ("y", 1.0)]);

        let combined = interleave(&first, &second, 10);
        let ids: Vec<&str> = combined.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "x", "b", "c", "y"]);
    }

    #[test]
    fn interleave_stops_at_limit() {
        let first = scored(&[("a", 3.0), ("b", 2.0)]);
        let second = scored(&[("x", 3.0), ("y", 2.0)]);

        let combined = interleave(&first, &second, 3);
        let ids: Vec<&str> = combined.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "x", "b"]);
    }

    #[test]
    fn interleave_handles_uneven_lists() {
        let first = scored(&[("a", 1.0)]);
        let second = scored(&[("x", 3.0), ("y", 2.0), ("z", 1.0)]);

        let combined = interleave(&first, &second, 10);
        let ids: Vec<&str> = combined.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "x", "y", "z"]);
    }

    #[test]
    fn interleave_of_empty_lists_is_empty() {
        assert!(interleave(&[], &[], 5).is_empty());
    }
}
