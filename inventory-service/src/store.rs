use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{InventoryError, Result};
use crate::models::*;
use crate::schema::*;

/// Load a stock row by its (product, variant) key. An empty or absent
/// variant matches rows whose variant column is NULL or the empty string;
/// a non-empty variant matches exactly.
pub async fn find_stock(
    conn: &mut AsyncPgConnection,
    product_id: &str,
    variant_id: Option<&str>,
) -> Result<Option<Stock>> {
    let row = match normalize_variant(variant_id) {
        Some(variant) => {
            stocks::table
                .filter(stocks::product_id.eq(product_id))
                .filter(stocks::variant_id.eq(variant))
                .first::<Stock>(conn)
                .await
                .optional()?
        }
        None => {
            stocks::table
                .filter(stocks::product_id.eq(product_id))
                .filter(stocks::variant_id.is_null().or(stocks::variant_id.eq("")))
                .first::<Stock>(conn)
                .await
                .optional()?
        }
    };
    Ok(row)
}

/// Same key match as [`find_stock`], but takes a `FOR UPDATE` row lock.
/// Only call inside a transaction.
pub async fn find_stock_for_update(
    conn: &mut AsyncPgConnection,
    product_id: &str,
    variant_id: Option<&str>,
) -> Result<Option<Stock>> {
    let row = match normalize_variant(variant_id) {
        Some(variant) => {
            stocks::table
                .filter(stocks::product_id.eq(product_id))
                .filter(stocks::variant_id.eq(variant))
                .for_update()
                .first::<Stock>(conn)
                .await
                .optional()?
        }
        None => {
            stocks::table
                .filter(stocks::product_id.eq(product_id))
                .filter(stocks::variant_id.is_null().or(stocks::variant_id.eq("")))
                .for_update()
                .first::<Stock>(conn)
                .await
                .optional()?
        }
    };
    Ok(row)
}

pub fn normalize_variant(variant_id: Option<&str>) -> Option<&str> {
    match variant_id {
        None | Some("") => None,
        Some(v) => Some(v),
    }
}

/// New (total, available) after applying an operation to a locked row.
/// SUBTRACT refuses to take more than is available; all results clamp at 0.
pub fn apply_operation(
    total: i32,
    reserved: i32,
    available: i32,
    quantity: i32,
    operation: StockOperation,
) -> Result<(i32, i32)> {
    let (new_total, new_available) = match operation {
        StockOperation::Add => (total + quantity, available + quantity),
        StockOperation::Subtract => {
            if available < quantity {
                return Err(InventoryError::InsufficientStock {
                    available,
                    requested: quantity,
                });
            }
            (total - quantity, available - quantity)
        }
        StockOperation::Set => (quantity, quantity - reserved),
    };
    Ok((new_total.max(0), new_available.max(0)))
}

/// Admin stock adjustment. Runs as a single transaction: lock, apply,
/// persist, append the audit movement. An ADD against a missing key seeds
/// the row; SUBTRACT and SET require an existing row.
pub async fn update_quantity(
    conn: &mut AsyncPgConnection,
    product_id: &str,
    variant_id: Option<&str>,
    quantity: i32,
    operation: StockOperation,
    reason: &str,
    created_by: Option<&str>,
) -> Result<Stock> {
    let product_id = product_id.to_string();
    let variant_id = normalize_variant(variant_id).map(str::to_string);
    let reason = reason.to_string();
    let created_by = created_by.map(str::to_string);

    conn.transaction::<Stock, InventoryError, _>(|conn| {
        async move {
            let existing =
                find_stock_for_update(conn, &product_id, variant_id.as_deref()).await?;

            let stock = match existing {
                Some(stock) => stock,
                None if operation == StockOperation::Add => {
                    let seeded = NewStock {
                        id: Uuid::new_v4(),
                        product_id: product_id.clone(),
                        variant_id: variant_id.clone(),
                        warehouse_id: None,
                        total: 0,
                        reserved: 0,
                        available: 0,
                    };
                    diesel::insert_into(stocks::table)
                        .values(&seeded)
                        .get_result::<Stock>(conn)
                        .await?
                }
                None => {
                    return Err(InventoryError::NotFound(format!(
                        "stock not found for product {product_id}"
                    )))
                }
            };

            let previous_total = stock.total;
            let (new_total, new_available) = apply_operation(
                stock.total,
                stock.reserved,
                stock.available,
                quantity,
                operation,
            )?;

            let updated = diesel::update(stocks::table.filter(stocks::id.eq(stock.id)))
                .set((
                    stocks::total.eq(new_total),
                    stocks::available.eq(new_available),
                    stocks::updated_at.eq(Utc::now()),
                ))
                .get_result::<Stock>(conn)
                .await?;

            let movement = NewStockMovement {
                id: Uuid::new_v4(),
                product_id: product_id.clone(),
                variant_id: variant_id.clone(),
                warehouse_id: updated.warehouse_id.clone(),
                quantity,
                operation: operation.as_str().to_string(),
                reason,
                previous_qty: previous_total,
                new_qty: updated.total,
                created_by,
            };
            diesel::insert_into(stock_movements::table)
                .values(&movement)
                .execute(conn)
                .await?;

            Ok(updated)
        }
        .scope_boxed()
    })
    .await
}

/// Read-only availability probe: (enough, currently available).
pub async fn check_availability(
    conn: &mut AsyncPgConnection,
    product_id: &str,
    variant_id: Option<&str>,
    quantity: i32,
) -> Result<(bool, i32)> {
    match find_stock(conn, product_id, variant_id).await? {
        Some(stock) => Ok((stock.available >= quantity, stock.available)),
        None => Ok((false, 0)),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkCheckResult {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub available: bool,
}

/// Best-effort bulk probe: each line is checked independently, with no
/// isolation guarantees across lines.
pub async fn bulk_check_availability(
    conn: &mut AsyncPgConnection,
    lines: &[shared::ReservationLine],
) -> Result<Vec<BulkCheckResult>> {
    let mut results = Vec::with_capacity(lines.len());
    for line in lines {
        let (available, _) =
            check_availability(conn, &line.product_id, line.variant(), line.quantity).await?;
        results.push(BulkCheckResult {
            product_id: line.product_id.clone(),
            variant_id: line.variant().map(str::to_string),
            available,
        });
    }
    Ok(results)
}

/// Audit trail for a stock key, newest first.
pub async fn get_movements(
    conn: &mut AsyncPgConnection,
    product_id: &str,
    variant_id: Option<&str>,
    limit: i64,
) -> Result<Vec<StockMovement>> {
    let rows = match normalize_variant(variant_id) {
        Some(variant) => {
            stock_movements::table
                .filter(stock_movements::product_id.eq(product_id))
                .filter(stock_movements::variant_id.eq(variant))
                .order(stock_movements::created_at.desc())
                .limit(limit)
                .load::<StockMovement>(conn)
                .await?
        }
        None => {
            stock_movements::table
                .filter(stock_movements::product_id.eq(product_id))
                .order(stock_movements::created_at.desc())
                .limit(limit)
                .load::<StockMovement>(conn)
                .await?
        }
    };
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_raises_total_and_available() {
        let (total, available) =
            apply_operation(10, 2, 8, 5, StockOperation::Add).unwrap();
        assert_eq!((total, available), (15, 13));
    }

    #[test]
    fn subtract_requires_availability() {
        let err = apply_operation(10, 2, 8, 9, StockOperation::Subtract).unwrap_err();
        match err {
            InventoryError::InsufficientStock {
                available,
                requested,
            } => {
                assert_eq!(available, 8);
                assert_eq!(requested, 9);
            }
            other => panic!("unexpected error: {other}"),
        }

        let (total, available) =
            apply_operation(10, 2, 8, 8, StockOperation::Subtract).unwrap();
        assert_eq!((total, available), (2, 0));
    }

    #[test]
    fn set_rebases_available_on_reserved() {
        let (total, available) = apply_operation(10, 4, 6, 20, StockOperation::Set).unwrap();
        assert_eq!((total, available), (20, 16));

        // Setting below the reserved amount clamps available at zero.
        let (total, available) = apply_operation(10, 4, 6, 3, StockOperation::Set).unwrap();
        assert_eq!((total, available), (3, 0));
    }

    #[test]
    fn results_never_go_negative() {
        let (total, available) = apply_operation(0, 0, 0, 0, StockOperation::Set).unwrap();
        assert_eq!((total, available), (0, 0));
    }

    #[test]
    fn variant_empty_and_absent_are_the_same_key() {
        assert_eq!(normalize_variant(None), None);
        assert_eq!(normalize_variant(Some("")), None);
        assert_eq!(normalize_variant(Some("blue-s")), Some("blue-s"));
    }
}
