use chrono::{DateTime, Utc};
use diesel::dsl::sum;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::schema::user_interactions;

/// Record one (user, product, type) event. The triple is unique: recording
/// it again refreshes the metadata and timestamp instead of duplicating the
/// row. The weight is derived from the type, never supplied by the caller.
pub async fn record(
    conn: &mut AsyncPgConnection,
    user_id: &str,
    product_id: &str,
    interaction_type: InteractionType,
    metadata: Option<serde_json::Value>,
) -> Result<UserInteraction> {
    let row = NewUserInteraction {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        product_id: product_id.to_string(),
        interaction_type: interaction_type.as_str().to_string(),
        weight: interaction_type.weight(),
        metadata,
    };

    let stored = diesel::insert_into(user_interactions::table)
        .values(&row)
        .on_conflict((
            user_interactions::user_id,
            user_interactions::product_id,
            user_interactions::interaction_type,
        ))
        .do_update()
        .set((
            user_interactions::metadata.eq(excluded(user_interactions::metadata)),
            user_interactions::updated_at.eq(Utc::now()),
        ))
        .get_result::<UserInteraction>(conn)
        .await?;

    Ok(stored)
}

/// A user's interactions, newest first.
pub async fn for_user(
    conn: &mut AsyncPgConnection,
    user_id: &str,
    limit: i64,
) -> Result<Vec<UserInteraction>> {
    let rows = user_interactions::table
        .filter(user_interactions::user_id.eq(user_id))
        .order(user_interactions::created_at.desc())
        .limit(limit)
        .load::<UserInteraction>(conn)
        .await?;
    Ok(rows)
}

/// Distinct products a user has touched, in no particular order.
pub async fn products_for_user(
    conn: &mut AsyncPgConnection,
    user_id: &str,
) -> Result<Vec<String>> {
    let rows = user_interactions::table
        .filter(user_interactions::user_id.eq(user_id))
        .select(user_interactions::product_id)
        .distinct()
        .load::<String>(conn)
        .await?;
    Ok(rows)
}

/// Distinct users who have touched a product.
pub async fn users_for_product(
    conn: &mut AsyncPgConnection,
    product_id: &str,
) -> Result<Vec<String>> {
    let rows = user_interactions::table
        .filter(user_interactions::product_id.eq(product_id))
        .select(user_interactions::user_id)
        .distinct()
        .load::<String>(conn)
        .await?;
    Ok(rows)
}

/// product -> summed weight over every interaction the user has with it.
pub async fn weights_for_user(
    conn: &mut AsyncPgConnection,
    user_id: &str,
) -> Result<HashMap<String, f64>> {
    let rows = user_interactions::table
        .filter(user_interactions::user_id.eq(user_id))
        .group_by(user_interactions::product_id)
        .select((user_interactions::product_id, sum(user_interactions::weight)))
        .load::<(String, Option<f64>)>(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(product, weight)| (product, weight.unwrap_or(0.0)))
        .collect())
}

/// product -> (user -> summed weight) for a set of products, the input to
/// pairwise similarity. One query instead of one per (product, user).
pub async fn weight_vectors_for_products(
    conn: &mut AsyncPgConnection,
    product_ids: &[String],
) -> Result<HashMap<String, HashMap<String, f64>>> {
    let rows = user_interactions::table
        .filter(user_interactions::product_id.eq_any(product_ids))
        .group_by((user_interactions::product_id, user_interactions::user_id))
        .select((
            user_interactions::product_id,
            user_interactions::user_id,
            sum(user_interactions::weight),
        ))
        .load::<(String, String, Option<f64>)>(conn)
        .await?;

    let mut vectors: HashMap<String, HashMap<String, f64>> = HashMap::new();
    for (product, user, weight) in rows {
        vectors
            .entry(product)
            .or_default()
            .insert(user, weight.unwrap_or(0.0));
    }
    Ok(vectors)
}

/// Interactions recorded at or after `since`, newest first. A zero limit
/// means no limit.
pub async fn recent(
    conn: &mut AsyncPgConnection,
    since: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<UserInteraction>> {
    let query = user_interactions::table
        .filter(user_interactions::created_at.ge(since))
        .order(user_interactions::created_at.desc());

    let rows = if limit > 0 {
        query.limit(limit).load::<UserInteraction>(conn).await?
    } else {
        query.load::<UserInteraction>(conn).await?
    };
    Ok(rows)
}

/// Distinct products with any interaction at or after `since`.
pub async fn products_since(
    conn: &mut AsyncPgConnection,
    since: DateTime<Utc>,
) -> Result<Vec<String>> {
    let rows = user_interactions::table
        .filter(user_interactions::created_at.ge(since))
        .select(user_interactions::product_id)
        .distinct()
        .load::<String>(conn)
        .await?;
    Ok(rows)
}

pub async fn count_for_user(conn: &mut AsyncPgConnection, user_id: &str) -> Result<i64> {
    let count = user_interactions::table
        .filter(user_interactions::user_id.eq(user_id))
        .count()
        .get_result::<i64>(conn)
        .await?;
    Ok(count)
}

/// Retention sweep: drop interactions recorded before `before`. Returns how
/// many rows went away.
pub async fn delete_older_than(
    conn: &mut AsyncPgConnection,
    before: DateTime<Utc>,
) -> Result<usize> {
    let deleted = diesel::delete(
        user_interactions::table.filter(user_interactions::created_at.lt(before)),
    )
    .execute(conn)
    .await?;
    Ok(deleted)
}
