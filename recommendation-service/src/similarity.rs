use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::interactions;
use crate::models::*;
use crate::schema::product_similarities;

/// A scored, canonicalized product pair ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PairScore {
    pub product_id_1: String,
    pub product_id_2: String,
    pub score: f64,
    pub common_users: i32,
}

/// Cosine similarity between two user-weight vectors, with the number of
/// users carrying positive weight on both sides. A zero norm on either side
/// yields zero; results clamp into [0, 1].
pub fn cosine(w1: &HashMap<String, f64>, w2: &HashMap<String, f64>) -> (f64, i32) {
    let mut users: HashSet<&String> = w1.keys().collect();
    users.extend(w2.keys());

    let mut dot = 0.0;
    let mut norm1 = 0.0;
    let mut norm2 = 0.0;
    let mut common_users = 0;

    for user in users {
        let a = w1.get(user).copied().unwrap_or(0.0);
        let b = w2.get(user).copied().unwrap_or(0.0);
        dot += a * b;
        norm1 += a * a;
        norm2 += b * b;
        if a > 0.0 && b > 0.0 {
            common_users += 1;
        }
    }

    if norm1 == 0.0 || norm2 == 0.0 {
        return (0.0, common_users);
    }

    let score = dot / (norm1.sqrt() * norm2.sqrt());
    (score.clamp(0.0, 1.0), common_users)
}

/// Order a pair so the lexicographically smaller id comes first. The store
/// never relies on callers having done this.
pub fn canonical_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Score every unordered pair of the given products, keeping pairs that
/// clear both the score threshold and the common-user floor.
pub fn score_pairs(vectors: &HashMap<String, HashMap<String, f64>>) -> Vec<PairScore> {
    let mut products: Vec<&String> = vectors.keys().collect();
    products.sort();

    let mut pairs = Vec::new();
    for i in 0..products.len() {
        for j in (i + 1)..products.len() {
            let p1 = products[i];
            let p2 = products[j];
            let (score, common_users) = cosine(&vectors[p1], &vectors[p2]);
            if score >= SIMILARITY_THRESHOLD && common_users >= SIMILARITY_MIN_COMMON_USERS {
                let (first, second) = canonical_pair(p1, p2);
                pairs.push(PairScore {
                    product_id_1: first,
                    product_id_2: second,
                    score,
                    common_users,
                });
            }
        }
    }
    pairs
}

/// Full recalculation over products with recent activity. Aborts quietly
/// when there is not enough data to pair anything. Returns how many pairs
/// were stored.
pub async fn recalculate(conn: &mut AsyncPgConnection) -> Result<usize> {
    let since = Utc::now() - Duration::days(TRENDING_WINDOW_DAYS * 2);
    let products = interactions::products_since(conn, since).await?;

    if products.len() < 2 {
        warn!(
            products = products.len(),
            "not enough products for similarity calculation"
        );
        return Ok(0);
    }

    info!(products = products.len(), "calculating product similarities");

    let vectors = interactions::weight_vectors_for_products(conn, &products).await?;
    let pairs = score_pairs(&vectors);

    let mut stored = 0;
    for batch in pairs.chunks(SIMILARITY_BATCH_SIZE) {
        stored += upsert_batch(conn, batch).await?;
    }

    info!(pairs = stored, "similarity calculation complete");
    Ok(stored)
}

/// Upsert a batch of canonical pairs, refreshing score, method, and the
/// common-user count on conflict.
pub async fn upsert_batch(conn: &mut AsyncPgConnection, pairs: &[PairScore]) -> Result<usize> {
    if pairs.is_empty() {
        return Ok(0);
    }

    let rows: Vec<NewProductSimilarity> = pairs
        .iter()
        .map(|pair| NewProductSimilarity {
            id: Uuid::new_v4(),
            product_id_1: pair.product_id_1.clone(),
            product_id_2: pair.product_id_2.clone(),
            similarity_score: pair.score,
            similarity_method: SIMILARITY_METHOD_COSINE.to_string(),
            common_users: pair.common_users,
        })
        .collect();

    let written = diesel::insert_into(product_similarities::table)
        .values(&rows)
        .on_conflict((
            product_similarities::product_id_1,
            product_similarities::product_id_2,
        ))
        .do_update()
        .set((
            product_similarities::similarity_score
                .eq(excluded(product_similarities::similarity_score)),
            product_similarities::similarity_method
                .eq(excluded(product_similarities::similarity_method)),
            product_similarities::common_users.eq(excluded(product_similarities::common_users)),
            product_similarities::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;

    Ok(written)
}

/// Products similar to the given one, best first, as (counterpart, score).
/// Searches both sides of the canonical pair.
pub async fn similar_products(
    conn: &mut AsyncPgConnection,
    product_id: &str,
    limit: i64,
    min_score: f64,
) -> Result<Vec<(String, f64)>> {
    let rows = product_similarities::table
        .filter(
            product_similarities::product_id_1
                .eq(product_id)
                .or(product_similarities::product_id_2.eq(product_id)),
        )
        .filter(product_similarities::similarity_score.ge(min_score))
        .order(product_similarities::similarity_score.desc())
        .limit(limit)
        .load::<ProductSimilarity>(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            if row.product_id_1 == product_id {
                (row.product_id_2, row.similarity_score)
            } else {
                (row.product_id_1, row.similarity_score)
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries
            .iter()
            .map(|(user, weight)| (user.to_string(), *weight))
            .collect()
    }

    #[test]
    fn identical_vectors_score_one() {
        let w = weights(&[("u1", 5.0), ("u2", 5.0), ("u3", 5.0)]);
        let (score, common) = cosine(&w, &w);
        assert!((score - 1.0).abs() < 1e-9);
        assert_eq!(common, 3);
    }

    #[test]
    fn disjoint_vectors_score_zero_with_no_common_users() {
        let w1 = weights(&[("u1", 3.0)]);
        let w2 = weights(&[("u2", 3.0)]);
        let (score, common) = cosine(&w1, &w2);
        assert_eq!(score, 0.0);
        assert_eq!(common, 0);
    }

    #[test]
    fn empty_vector_scores_zero() {
        let w1 = weights(&[("u1", 3.0)]);
        let w2 = HashMap::new();
        let (score, common) = cosine(&w1, &w2);
        assert_eq!(score, 0.0);
        assert_eq!(common, 0);
    }

    #[test]
    fn negative_weights_do_not_count_as_common() {
        let w1 = weights(&[("u1", 2.0), ("u2", -1.0)]);
        let w2 = weights(&[("u1", 4.0), ("u2", -1.0)]);
        let (score, common) = cosine(&w1, &w2);
        assert_eq!(common, 1);
        assert!(score > 0.0 && score <= 1.0);
    }

    #[test]
    fn pairs_are_canonical() {
        assert_eq!(canonical_pair("b", "a"), ("a".into(), "b".into()));
        assert_eq!(canonical_pair("a", "b"), ("a".into(), "b".into()));
        assert_eq!(canonical_pair("a", "a"), ("a".into(), "a".into()));
    }

    #[test]
    fn weakly_correlated_pairs_fall_below_the_threshold() {
        // Two common users but opposite preferences: cosine 20/101, well
        // under 0.3.
        let mut vectors = HashMap::new();
        vectors.insert("p1".to_string(), weights(&[("u1", 1.0), ("u2", 10.0)]));
        vectors.insert("p2".to_string(), weights(&[("u1", 10.0), ("u2", 1.0)]));

        let (score, common) = cosine(&vectors["p1"], &vectors["p2"]);
        assert_eq!(common, 2);
        assert!(score < SIMILARITY_THRESHOLD);
        assert!(score_pairs(&vectors).is_empty());
    }

    #[test]
    fn score_pairs_applies_thresholds() {
        // Three users all touching both products: cosine 1.0, 3 common.
        let mut vectors = HashMap::new();
        vectors.insert(
            "p2".to_string(),
            weights(&[("u1", 5.0), ("u2", 5.0), ("u3", 5.0)]),
        );
        vectors.insert(
            "p1".to_string(),
            weights(&[("u1", 5.0), ("u2", 5.0), ("u3", 5.0)]),
        );
        // A third product seen by a single shared user: below the
        // common-user floor however well it correlates.
        vectors.insert("p3".to_string(), weights(&[("u1", 5.0)]));

        let pairs = score_pairs(&vectors);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].product_id_1, "p1");
        assert_eq!(pairs[0].product_id_2, "p2");
        assert!((pairs[0].score - 1.0).abs() < 1e-9);
        assert_eq!(pairs[0].common_users, 3);
    }
}
