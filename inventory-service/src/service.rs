use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::AsyncPgConnection;
use tracing::info;

use crate::cache::StockCache;
use crate::error::Result;
use crate::events::EventPublisher;
use crate::models::*;
use crate::reservations::{self, ReserveOutcome};
use crate::store::{self, BulkCheckResult};
use shared::{ReservationLine, StockEvent, StockEventKind};

type DbPool = Pool<AsyncPgConnection>;

/// Orchestrates the stock and reservation stores, keeps the read cache
/// coherent, and emits events. All counter mutations happen inside the
/// store transactions; this layer owns only cache and event side effects.
#[derive(Clone)]
pub struct InventoryService {
    pool: DbPool,
    cache: StockCache,
    events: EventPublisher,
}

impl InventoryService {
    pub fn new(pool: DbPool, cache: StockCache, events: EventPublisher) -> Self {
        Self {
            pool,
            cache,
            events,
        }
    }

    pub async fn check_stock(
        &self,
        product_id: &str,
        variant_id: Option<&str>,
        quantity: i32,
    ) -> Result<(bool, i32)> {
        if let Some(snapshot) = self.cache.get(product_id, variant_id).await {
            return Ok((snapshot.available >= quantity, snapshot.available));
        }

        let mut conn = self.pool.get().await?;
        store::check_availability(&mut conn, product_id, variant_id, quantity).await
    }

    pub async fn get_stock(
        &self,
        product_id: &str,
        variant_id: Option<&str>,
    ) -> Result<StockSnapshot> {
        if let Some(snapshot) = self.cache.get(product_id, variant_id).await {
            return Ok(snapshot);
        }

        let mut conn = self.pool.get().await?;
        let stock = store::find_stock(&mut conn, product_id, variant_id)
            .await?
            .ok_or_else(|| {
                crate::error::InventoryError::NotFound(format!(
                    "stock not found for product {product_id}"
                ))
            })?;

        let snapshot = StockSnapshot::from(&stock);
        self.cache.put(&snapshot).await;
        Ok(snapshot)
    }

    pub async fn update_stock(
        &self,
        product_id: &str,
        variant_id: Option<&str>,
        quantity: i32,
        operation: StockOperation,
        reason: &str,
        created_by: Option<&str>,
    ) -> Result<StockSnapshot> {
        let mut conn = self.pool.get().await?;
        let stock = store::update_quantity(
            &mut conn,
            product_id,
            variant_id,
            quantity,
            operation,
            reason,
            created_by,
        )
        .await?;

        let snapshot = StockSnapshot::from(&stock);
        self.cache.invalidate(product_id, variant_id).await;
        self.cache.put(&snapshot).await;

        self.events
            .publish(StockEvent::new(
                StockEventKind::Adjusted,
                None,
                vec![ReservationLine {
                    product_id: product_id.to_string(),
                    variant_id: store::normalize_variant(variant_id).map(str::to_string),
                    quantity,
                }],
            ))
            .await;

        info!(
            product_id,
            operation = operation.as_str(),
            new_total = snapshot.total,
            "stock updated"
        );
        Ok(snapshot)
    }

    pub async fn reserve_stock(
        &self,
        order_id: &str,
        lines: &[ReservationLine],
        ttl_seconds: i64,
    ) -> Result<ReserveOutcome> {
        let mut conn = self.pool.get().await?;
        let outcome = reservations::reserve(&mut conn, order_id, lines, ttl_seconds).await?;

        for line in lines {
            self.cache
                .invalidate(&line.product_id, line.variant())
                .await;
        }

        if outcome.success {
            self.events
                .publish(StockEvent::new(
                    StockEventKind::Reserved,
                    Some(order_id.to_string()),
                    lines.to_vec(),
                ))
                .await;
            info!(
                order_id,
                reservation_id = ?outcome.reservation_id,
                lines = lines.len(),
                "stock reserved"
            );
        }

        Ok(outcome)
    }

    pub async fn commit_reservation(&self, identifier: &str) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let settled = reservations::commit(&mut conn, identifier).await?;
        self.settled_side_effects(StockEventKind::Committed, identifier, &settled)
            .await;
        Ok(settled.len())
    }

    pub async fn release_reservation(&self, identifier: &str) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let settled = reservations::release(&mut conn, identifier).await?;
        self.settled_side_effects(StockEventKind::Released, identifier, &settled)
            .await;
        Ok(settled.len())
    }

    async fn settled_side_effects(
        &self,
        kind: StockEventKind,
        identifier: &str,
        settled: &[Reservation],
    ) {
        for hold in settled {
            self.cache
                .invalidate(&hold.product_id, hold.variant_id.as_deref())
                .await;
        }

        let lines = settled
            .iter()
            .map(|hold| ReservationLine {
                product_id: hold.product_id.clone(),
                variant_id: hold.variant_id.clone(),
                quantity: hold.quantity,
            })
            .collect();
        let order_id = settled.first().map(|hold| hold.order_id.clone());
        self.events.publish(StockEvent::new(kind, order_id, lines)).await;

        info!(identifier, count = settled.len(), "reservations settled");
    }

    pub async fn bulk_check_stock(
        &self,
        lines: &[ReservationLine],
    ) -> Result<Vec<BulkCheckResult>> {
        let mut conn = self.pool.get().await?;
        store::bulk_check_availability(&mut conn, lines).await
    }

    pub async fn get_movements(
        &self,
        product_id: &str,
        variant_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<StockMovement>> {
        let mut conn = self.pool.get().await?;
        store::get_movements(&mut conn, product_id, variant_id, limit).await
    }

    /// One expiry sweep; returns how many holds were reclaimed.
    pub async fn expire_old_reservations(&self) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let reclaimed = reservations::expire(&mut conn).await?;
        drop(conn);

        if reclaimed.is_empty() {
            return Ok(0);
        }

        for hold in &reclaimed {
            self.cache
                .invalidate(&hold.product_id, hold.variant_id.as_deref())
                .await;
        }

        let lines = reclaimed
            .iter()
            .map(|hold| ReservationLine {
                product_id: hold.product_id.clone(),
                variant_id: hold.variant_id.clone(),
                quantity: hold.quantity,
            })
            .collect();
        self.events
            .publish(StockEvent::new(StockEventKind::Expired, None, lines))
            .await;

        Ok(reclaimed.len())
    }

    pub async fn find_reservations(&self, identifier: &str) -> Result<Vec<Reservation>> {
        let mut conn = self.pool.get().await?;
        reservations::find_by_identifier(&mut conn, identifier).await
    }
}
