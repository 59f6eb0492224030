use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{InventoryError, Result};
use crate::models::*;
use crate::schema::*;
use crate::store;
use shared::ReservationLine;

/// Outcome of a reserve call. Domain failures (missing stock, not enough
/// available) are reported here with per-line detail, not as errors; the
/// transaction has already been rolled back when `success` is false.
#[derive(Debug, Clone, Serialize)]
pub struct ReserveOutcome {
    pub reservation_id: Option<Uuid>,
    pub success: bool,
    pub results: Vec<LineResult>,
}

enum TxError {
    Abort(Vec<LineResult>),
    Other(InventoryError),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Other(err.into())
    }
}

impl From<InventoryError> for TxError {
    fn from(err: InventoryError) -> Self {
        TxError::Other(err)
    }
}

/// Place an all-or-nothing hold on every line of an order. Lines are
/// processed in input order; the first line that cannot be satisfied aborts
/// the whole transaction and the outcome carries the results seen up to and
/// including that line.
pub async fn reserve(
    conn: &mut AsyncPgConnection,
    order_id: &str,
    lines: &[ReservationLine],
    ttl_seconds: i64,
) -> Result<ReserveOutcome> {
    let order_id = order_id.to_string();
    let lines = lines.to_vec();
    let expires_at = Utc::now() + Duration::seconds(clamp_ttl_seconds(ttl_seconds));
    let reservation_id = Uuid::new_v4();

    let outcome = conn
        .transaction::<Vec<LineResult>, TxError, _>(|conn| {
            async move {
                diesel::sql_query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
                    .execute(conn)
                    .await?;

                let mut results = Vec::with_capacity(lines.len());

                for (index, line) in lines.iter().enumerate() {
                    let variant = line.variant();
                    let stock = store::find_stock_for_update(conn, &line.product_id, variant)
                        .await
                        .map_err(TxError::Other)?;

                    let stock = match stock {
                        Some(stock) => stock,
                        None => {
                            results.push(LineResult {
                                product_id: line.product_id.clone(),
                                variant_id: variant.map(str::to_string),
                                reserved: false,
                                available_quantity: 0,
                                error: Some("stock not found".into()),
                            });
                            return Err(TxError::Abort(results));
                        }
                    };

                    if stock.available < line.quantity {
                        results.push(LineResult {
                            product_id: line.product_id.clone(),
                            variant_id: variant.map(str::to_string),
                            reserved: false,
                            available_quantity: stock.available,
                            error: Some(format!(
                                "insufficient stock: available={}, requested={}",
                                stock.available, line.quantity
                            )),
                        });
                        return Err(TxError::Abort(results));
                    }

                    let new_available = stock.available - line.quantity;
                    diesel::update(stocks::table.filter(stocks::id.eq(stock.id)))
                        .set((
                            stocks::available.eq(new_available),
                            stocks::reserved.eq(stock.reserved + line.quantity),
                            stocks::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)
                        .await?;

                    // The id handed back to the caller is the first line's
                    // row id; every line remains addressable via order_id.
                    let row_id = if index == 0 {
                        reservation_id
                    } else {
                        Uuid::new_v4()
                    };
                    let hold = NewReservation {
                        id: row_id,
                        order_id: order_id.clone(),
                        product_id: line.product_id.clone(),
                        variant_id: variant.map(str::to_string),
                        quantity: line.quantity,
                        status: ReservationStatus::Pending.as_str().to_string(),
                        expires_at,
                    };
                    diesel::insert_into(reservations::table)
                        .values(&hold)
                        .execute(conn)
                        .await?;

                    results.push(LineResult {
                        product_id: line.product_id.clone(),
                        variant_id: variant.map(str::to_string),
                        reserved: true,
                        available_quantity: new_available,
                        error: None,
                    });
                }

                Ok(results)
            }
            .scope_boxed()
        })
        .await;

    match outcome {
        Ok(results) => Ok(ReserveOutcome {
            reservation_id: Some(reservation_id),
            success: true,
            results,
        }),
        Err(TxError::Abort(results)) => Ok(ReserveOutcome {
            reservation_id: None,
            success: false,
            results,
        }),
        Err(TxError::Other(err)) => Err(err),
    }
}

/// Finalize every pending hold matching the identifier: the reserved
/// quantity is consumed (total already dropped at reserve time from the
/// buyer's point of view, so only `reserved` moves here).
pub async fn commit(conn: &mut AsyncPgConnection, identifier: &str) -> Result<Vec<Reservation>> {
    settle(conn, identifier, ReservationStatus::Committed).await
}

/// Undo every pending hold matching the identifier, returning the held
/// quantity to `available`.
pub async fn release(conn: &mut AsyncPgConnection, identifier: &str) -> Result<Vec<Reservation>> {
    settle(conn, identifier, ReservationStatus::Released).await
}

async fn settle(
    conn: &mut AsyncPgConnection,
    identifier: &str,
    target: ReservationStatus,
) -> Result<Vec<Reservation>> {
    let identifier = identifier.to_string();

    conn.transaction::<Vec<Reservation>, InventoryError, _>(|conn| {
        async move {
            diesel::sql_query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
                .execute(conn)
                .await?;

            let pending = load_pending_for_update(conn, &identifier).await?;
            if pending.is_empty() {
                // Distinguish an unknown identifier from holds that have
                // already been settled.
                let any = find_by_identifier(conn, &identifier).await?;
                if any.is_empty() {
                    return Err(InventoryError::NotFound(format!(
                        "no pending reservations for {identifier}"
                    )));
                }
                return Err(InventoryError::Conflict(format!(
                    "reservations for {identifier} are no longer pending"
                )));
            }

            for hold in &pending {
                debug_assert!(ReservationStatus::parse(&hold.status)
                    .is_some_and(|status| status.can_transition_to(target)));

                let stock = store::find_stock_for_update(
                    conn,
                    &hold.product_id,
                    hold.variant_id.as_deref(),
                )
                .await?
                .ok_or_else(|| {
                    InventoryError::Internal(format!(
                        "stock row missing for reservation {}",
                        hold.id
                    ))
                })?;

                let (new_available, new_reserved) = match target {
                    ReservationStatus::Committed => {
                        (stock.available, stock.reserved - hold.quantity)
                    }
                    ReservationStatus::Released => (
                        stock.available + hold.quantity,
                        stock.reserved - hold.quantity,
                    ),
                    _ => {
                        return Err(InventoryError::Internal(format!(
                            "unsupported settle target {}",
                            target.as_str()
                        )))
                    }
                };

                diesel::update(stocks::table.filter(stocks::id.eq(stock.id)))
                    .set((
                        stocks::available.eq(new_available),
                        stocks::reserved.eq(new_reserved),
                        stocks::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;

                diesel::update(reservations::table.filter(reservations::id.eq(hold.id)))
                    .set((
                        reservations::status.eq(target.as_str()),
                        reservations::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;
            }

            Ok(pending)
        }
        .scope_boxed()
    })
    .await
}

/// Pending holds matching `id = identifier OR order_id = identifier`,
/// locked for the remainder of the transaction.
async fn load_pending_for_update(
    conn: &mut AsyncPgConnection,
    identifier: &str,
) -> Result<Vec<Reservation>> {
    let rows = match Uuid::parse_str(identifier) {
        Ok(uuid) => {
            reservations::table
                .filter(reservations::status.eq(ReservationStatus::Pending.as_str()))
                .filter(
                    reservations::id
                        .eq(uuid)
                        .or(reservations::order_id.eq(identifier)),
                )
                .for_update()
                .load::<Reservation>(conn)
                .await?
        }
        Err(_) => {
            reservations::table
                .filter(reservations::status.eq(ReservationStatus::Pending.as_str()))
                .filter(reservations::order_id.eq(identifier))
                .for_update()
                .load::<Reservation>(conn)
                .await?
        }
    };
    Ok(rows)
}

/// One sweep over stale holds. All expirations observed by the sweep land
/// in a single transaction; holds whose stock row has vanished are skipped
/// rather than aborting the sweep. Returns the reclaimed holds.
pub async fn expire(conn: &mut AsyncPgConnection) -> Result<Vec<Reservation>> {
    conn.transaction::<Vec<Reservation>, InventoryError, _>(|conn| {
        async move {
            diesel::sql_query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
                .execute(conn)
                .await?;

            let stale = reservations::table
                .filter(reservations::status.eq(ReservationStatus::Pending.as_str()))
                .filter(reservations::expires_at.lt(Utc::now()))
                .for_update()
                .load::<Reservation>(conn)
                .await?;

            let mut reclaimed = Vec::with_capacity(stale.len());

            for hold in stale {
                let stock = store::find_stock_for_update(
                    conn,
                    &hold.product_id,
                    hold.variant_id.as_deref(),
                )
                .await?;

                let stock = match stock {
                    Some(stock) => stock,
                    None => continue,
                };

                diesel::update(stocks::table.filter(stocks::id.eq(stock.id)))
                    .set((
                        stocks::available.eq(stock.available + hold.quantity),
                        stocks::reserved.eq(stock.reserved - hold.quantity),
                        stocks::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;

                diesel::update(reservations::table.filter(reservations::id.eq(hold.id)))
                    .set((
                        reservations::status.eq(ReservationStatus::Expired.as_str()),
                        reservations::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;

                reclaimed.push(hold);
            }

            Ok(reclaimed)
        }
        .scope_boxed()
    })
    .await
}

/// All holds for an identifier regardless of status, for audit reads and
/// cache invalidation.
pub async fn find_by_identifier(
    conn: &mut AsyncPgConnection,
    identifier: &str,
) -> Result<Vec<Reservation>> {
    let rows = match Uuid::parse_str(identifier) {
        Ok(uuid) => {
            reservations::table
                .filter(
                    reservations::id
                        .eq(uuid)
                        .or(reservations::order_id.eq(identifier)),
                )
                .load::<Reservation>(conn)
                .await?
        }
        Err(_) => {
            reservations::table
                .filter(reservations::order_id.eq(identifier))
                .load::<Reservation>(conn)
                .await?
        }
    };
    Ok(rows)
}
