use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::interactions;
use crate::models::*;
use crate::schema::trending_products;

/// Rows per upsert statement, kept well under the Postgres parameter cap.
const UPSERT_BATCH_SIZE: usize = 100;

/// Per-product aggregate over the trending window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendingStats {
    pub product_id: String,
    pub view_count: i32,
    pub cart_count: i32,
    pub purchase_count: i32,
    pub wishlist_count: i32,
    pub score: f64,
}

impl TrendingStats {
    pub fn total_interactions(&self) -> i32 {
        self.view_count + self.cart_count + self.purchase_count + self.wishlist_count
    }
}

/// The counter weight of an interaction type in the trending score. Types
/// without a counter contribute nothing.
fn counter_weight(interaction_type: InteractionType) -> f64 {
    match interaction_type {
        InteractionType::View => TRENDING_WEIGHT_VIEWS,
        InteractionType::AddToCart => TRENDING_WEIGHT_CARTS,
        InteractionType::Purchase => TRENDING_WEIGHT_PURCHASES,
        InteractionType::Wishlist => TRENDING_WEIGHT_WISHLISTS,
        InteractionType::RemoveCart | InteractionType::Search => 0.0,
    }
}

/// One event's contribution: its counter weight decayed by how many days
/// ago it happened. Scores are additive across events, each with its own
/// recency decay.
pub fn decayed_contribution(
    interaction_type: InteractionType,
    occurred_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let weight = counter_weight(interaction_type);
    if weight == 0.0 {
        return 0.0;
    }
    let days_since = (now - occurred_at).num_seconds().max(0) as f64 / 86_400.0;
    weight * TRENDING_DECAY_FACTOR.powf(days_since)
}

/// Aggregate raw interactions into per-product stats, dropping products
/// below the interaction floor.
pub fn aggregate(interactions: &[UserInteraction], now: DateTime<Utc>) -> Vec<TrendingStats> {
    let mut stats: HashMap<String, TrendingStats> = HashMap::new();

    for interaction in interactions {
        let Some(interaction_type) = InteractionType::parse(&interaction.interaction_type) else {
            continue;
        };

        let entry = stats
            .entry(interaction.product_id.clone())
            .or_insert_with(|| TrendingStats {
                product_id: interaction.product_id.clone(),
                ..TrendingStats::default()
            });

        match interaction_type {
            InteractionType::View => entry.view_count += 1,
            InteractionType::AddToCart => entry.cart_count += 1,
            InteractionType::Purchase => entry.purchase_count += 1,
            InteractionType::Wishlist => entry.wishlist_count += 1,
            InteractionType::RemoveCart | InteractionType::Search => {}
        }

        entry.score += decayed_contribution(interaction_type, interaction.created_at, now);
    }

    let mut kept: Vec<TrendingStats> = stats
        .into_values()
        .filter(|entry| entry.total_interactions() >= TRENDING_MIN_INTERACTIONS)
        .collect();
    kept.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    kept
}

/// Recompute the trending index over the window and batch-upsert the rows.
/// Returns how many products made the cut.
pub async fn recalculate(conn: &mut AsyncPgConnection) -> Result<usize> {
    let now = Utc::now();
    let since = now - Duration::days(TRENDING_WINDOW_DAYS);
    let window = interactions::recent(conn, since, 0).await?;
    let stats = aggregate(&window, now);

    if stats.is_empty() {
        return Ok(0);
    }

    let rows: Vec<NewTrendingProduct> = stats
        .iter()
        .map(|entry| NewTrendingProduct {
            id: Uuid::new_v4(),
            product_id: entry.product_id.clone(),
            trending_score: entry.score,
            view_count: entry.view_count,
            cart_count: entry.cart_count,
            purchase_count: entry.purchase_count,
            wishlist_count: entry.wishlist_count,
            calculated_at: now,
        })
        .collect();

    let mut written = 0;
    for batch in rows.chunks(UPSERT_BATCH_SIZE) {
        written += diesel::insert_into(trending_products::table)
            .values(batch)
            .on_conflict(trending_products::product_id)
            .do_update()
            .set((
                trending_products::trending_score
                    .eq(excluded(trending_products::trending_score)),
                trending_products::view_count.eq(excluded(trending_products::view_count)),
                trending_products::cart_count.eq(excluded(trending_products::cart_count)),
                trending_products::purchase_count
                    .eq(excluded(trending_products::purchase_count)),
                trending_products::wishlist_count
                    .eq(excluded(trending_products::wishlist_count)),
                trending_products::calculated_at
                    .eq(excluded(trending_products::calculated_at)),
                trending_products::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;
    }

    info!(products = written, "trending recalculation complete");
    Ok(written)
}

/// Bump the live counter matching a just-recorded interaction, creating the
/// row when the product has never trended before. Types without a counter
/// are a no-op.
pub async fn increment_counter(
    conn: &mut AsyncPgConnection,
    product_id: &str,
    interaction_type: InteractionType,
) -> Result<()> {
    let seed = NewTrendingProduct {
        id: Uuid::new_v4(),
        product_id: product_id.to_string(),
        trending_score: 0.0,
        view_count: (interaction_type == InteractionType::View) as i32,
        cart_count: (interaction_type == InteractionType::AddToCart) as i32,
        purchase_count: (interaction_type == InteractionType::Purchase) as i32,
        wishlist_count: (interaction_type == InteractionType::Wishlist) as i32,
        calculated_at: Utc::now(),
    };

    match interaction_type {
        InteractionType::View => {
            diesel::insert_into(trending_products::table)
                .values(&seed)
                .on_conflict(trending_products::product_id)
                .do_update()
                .set(trending_products::view_count.eq(trending_products::view_count + 1))
                .execute(conn)
                .await?;
        }
        InteractionType::AddToCart => {
            diesel::insert_into(trending_products::table)
                .values(&seed)
                .on_conflict(trending_products::product_id)
                .do_update()
                .set(trending_products::cart_count.eq(trending_products::cart_count + 1))
                .execute(conn)
                .await?;
        }
        InteractionType::Purchase => {
            diesel::insert_into(trending_products::table)
                .values(&seed)
                .on_conflict(trending_products::product_id)
                .do_update()
                .set(
                    trending_products::purchase_count.eq(trending_products::purchase_count + 1),
                )
                .execute(conn)
                .await?;
        }
        InteractionType::Wishlist => {
            diesel::insert_into(trending_products::table)
                .values(&seed)
                .on_conflict(trending_products::product_id)
                .do_update()
                .set(
                    trending_products::wishlist_count.eq(trending_products::wishlist_count + 1),
                )
                .execute(conn)
                .await?;
        }
        InteractionType::RemoveCart | InteractionType::Search => {}
    }

    Ok(())
}

/// Top trending products by score, best first.
pub async fn top(
    conn: &mut AsyncPgConnection,
    limit: i64,
    min_score: f64,
) -> Result<Vec<TrendingProduct>> {
    let rows = trending_products::table
        .filter(trending_products::trending_score.ge(min_score))
        .order(trending_products::trending_score.desc())
        .limit(limit)
        .load::<TrendingProduct>(conn)
        .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interaction(
        user: &str,
        product: &str,
        kind: InteractionType,
        created_at: DateTime<Utc>,
    ) -> UserInteraction {
        UserInteraction {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            product_id: product.to_string(),
            interaction_type: kind.as_str().to_string(),
            weight: kind.weight(),
            metadata: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn fresh_views_decay_nothing() {
        let now = Utc::now();
        let score = decayed_contribution(InteractionType::View, now, now);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn six_day_old_views_decay_to_about_half() {
        let now = Utc::now();
        let then = now - Duration::days(6);
        let score = decayed_contribution(InteractionType::View, then, now);
        // 0.9^6 = 0.531441
        assert!((score - 0.531_441).abs() < 1e-6);
    }

    #[test]
    fn searches_and_cart_removals_do_not_score() {
        let now = Utc::now();
        assert_eq!(decayed_contribution(InteractionType::Search, now, now), 0.0);
        assert_eq!(
            decayed_contribution(InteractionType::RemoveCart, now, now),
            0.0
        );
    }

    #[test]
    fn recent_product_outranks_stale_one() {
        let now = Utc::now();
        let mut window = Vec::new();
        // Ten views of X today, ten views of Y six days ago.
        for i in 0..10 {
            window.push(interaction(&format!("u{i}"), "x", InteractionType::View, now));
            window.push(interaction(
                &format!("u{i}"),
                "y",
                InteractionType::View,
                now - Duration::days(6),
            ));
        }

        let stats = aggregate(&window, now);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].product_id, "x");
        assert!((stats[0].score - 10.0).abs() < 1e-6);
        assert!((stats[1].score - 5.314_41).abs() < 1e-4);
        assert!(stats[0].score > stats[1].score);
    }

    #[test]
    fn products_below_the_interaction_floor_are_dropped() {
        let now = Utc::now();
        let window: Vec<UserInteraction> = (0..4)
            .map(|i| interaction(&format!("u{i}"), "p", InteractionType::View, now))
            .collect();
        assert!(aggregate(&window, now).is_empty());

        let window: Vec<UserInteraction> = (0..5)
            .map(|i| interaction(&format!("u{i}"), "p", InteractionType::View, now))
            .collect();
        let stats = aggregate(&window, now);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].view_count, 5);
    }

    #[test]
    fn score_grows_with_each_counter() {
        let now = Utc::now();
        let base: Vec<UserInteraction> = (0..5)
            .map(|i| interaction(&format!("u{i}"), "p", InteractionType::View, now))
            .collect();
        let base_score = aggregate(&base, now)[0].score;

        let mut more = base.clone();
        more.push(interaction("u9", "p", InteractionType::Purchase, now));
        let more_score = aggregate(&more, now)[0].score;

        assert!(more_score > base_score);
    }
}
