use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{NewOrder, Notification, OrderStore, PaymentConfirmation};
use crate::inventory;
use crate::lifecycle::{self, Transition};
use crate::models::{NewTicket, Order, OrderDetails, OrderItem, OrderStatus, Ticket, TicketTier};
use crate::utils::error::AppError;

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Tier administration belongs to the event service; this exists for
    /// seeding and tests.
    pub async fn insert_tier(
        &self,
        event_id: Uuid,
        name: &str,
        unit_price: i64,
        capacity: i32,
    ) -> Result<TicketTier, AppError> {
        let tier = sqlx::query_as::<_, TicketTier>(
            r#"
            INSERT INTO ticket_tiers (id, event_id, name, unit_price, capacity, sold, available)
            VALUES ($1, $2, $3, $4, $5, 0, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(name)
        .bind(unit_price)
        .bind(capacity)
        .fetch_one(&self.pool)
        .await?;
        Ok(tier)
    }

    async fn load_items(conn: &mut PgConnection, order_id: Uuid) -> Result<Vec<OrderItem>, AppError> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = $1 ORDER BY tier_name, id",
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(items)
    }
}

fn map_insert_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::InternalServerError(format!("Order reference collision: {}", db.message()))
        }
        _ => AppError::DatabaseError(err),
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_tier(&self, event_id: Uuid, name: &str) -> Result<Option<TicketTier>, AppError> {
        let tier = sqlx::query_as::<_, TicketTier>(
            "SELECT * FROM ticket_tiers WHERE event_id = $1 AND name = $2",
        )
        .bind(event_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tier)
    }

    async fn get_tier(&self, tier_id: Uuid) -> Result<Option<TicketTier>, AppError> {
        let tier = sqlx::query_as::<_, TicketTier>("SELECT * FROM ticket_tiers WHERE id = $1")
            .bind(tier_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tier)
    }

    async fn create_order(&self, new_order: NewOrder) -> Result<OrderDetails, AppError> {
        let mut tx = self.pool.begin().await?;

        // Lock tiers in id order so overlapping carts cannot deadlock.
        let mut lines: Vec<_> = new_order.items.iter().collect();
        lines.sort_by_key(|line| line.tier_id);
        for line in &lines {
            inventory::reserve(&mut tx, line.tier_id, line.quantity).await?;
        }

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (
                id, reference, buyer_id, guest_session_id, status,
                subtotal, service_fee, vat_amount, final_total, gateway_fee, platform_profit,
                contact_name, contact_email, contact_phone
            )
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_order.reference)
        .bind(new_order.purchaser.buyer_id())
        .bind(new_order.purchaser.guest_session_id())
        .bind(new_order.fees.subtotal)
        .bind(new_order.fees.service_fee)
        .bind(new_order.fees.vat_amount)
        .bind(new_order.fees.final_total)
        .bind(new_order.fees.gateway_fee)
        .bind(new_order.fees.platform_profit)
        .bind(&new_order.contact.name)
        .bind(&new_order.contact.email)
        .bind(new_order.contact.phone.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        let mut items = Vec::with_capacity(new_order.items.len());
        for line in &new_order.items {
            let item = sqlx::query_as::<_, OrderItem>(
                r#"
                INSERT INTO order_items (
                    id, order_id, event_id, tier_id, tier_name, quantity, unit_price, subtotal
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order.id)
            .bind(line.event_id)
            .bind(line.tier_id)
            .bind(&line.tier_name)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.subtotal)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        tx.commit().await?;
        Ok(OrderDetails { order, items })
    }

    async fn find_order(&self, reference: &str) -> Result<Option<OrderDetails>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&mut *conn)
            .await?;

        match order {
            Some(order) => {
                let items = Self::load_items(&mut conn, order.id).await?;
                Ok(Some(OrderDetails { order, items }))
            }
            None => Ok(None),
        }
    }

    async fn record_webhook_attempt(&self, reference: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET webhook_attempts = webhook_attempts + 1, updated_at = NOW()
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_webhook_failure(
        &self,
        reference: Option<&str>,
        reason: &str,
    ) -> Result<(), AppError> {
        sqlx::query("INSERT INTO webhook_failures (reference, reason) VALUES ($1, $2)")
            .bind(reference)
            .bind(reason)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn flag_for_review(
        &self,
        reference: &str,
        amount_paid: i64,
        reason: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET flagged_for_review = TRUE,
                review_reason = $3,
                amount_paid = $2,
                updated_at = NOW()
            WHERE reference = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(reference)
        .bind(amount_paid)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn confirm_payment(
        &self,
        reference: &str,
        confirmation: PaymentConfirmation,
        tickets: Vec<NewTicket>,
        notification: Notification,
    ) -> Result<Transition, AppError> {
        let mut tx = self.pool.begin().await?;

        let order_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET status = 'success',
                amount_paid = $2,
                payment_channel = $3,
                paid_at = $4,
                updated_at = NOW()
            WHERE reference = $1 AND status IN ('pending', 'processing')
            RETURNING id
            "#,
        )
        .bind(reference)
        .bind(confirmation.amount_paid)
        .bind(confirmation.channel.as_deref())
        .bind(confirmation.paid_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order_id) = order_id else {
            return Ok(Transition::AlreadyProcessed);
        };

        for ticket in &tickets {
            sqlx::query(
                r#"
                INSERT INTO tickets (id, code, order_id, event_id, tier_id, buyer_id, status)
                VALUES ($1, $2, $3, $4, $5, $6, 'active')
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&ticket.code)
            .bind(order_id)
            .bind(ticket.event_id)
            .bind(ticket.tier_id)
            .bind(ticket.buyer_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO notification_outbox (recipient, template, payload) VALUES ($1, $2, $3)",
        )
        .bind(&notification.recipient)
        .bind(&notification.template)
        .bind(&notification.payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Transition::Applied)
    }

    async fn close_pending(&self, order_id: Uuid, to: OrderStatus) -> Result<Transition, AppError> {
        lifecycle::ensure_closing(to)?;
        let mut tx = self.pool.begin().await?;

        let closed: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            RETURNING id
            "#,
        )
        .bind(order_id)
        .bind(to)
        .fetch_optional(&mut *tx)
        .await?;

        if closed.is_none() {
            return Ok(Transition::AlreadyProcessed);
        }

        let lines: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT tier_id, quantity FROM order_items WHERE order_id = $1 ORDER BY tier_id",
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        for (tier_id, quantity) in lines {
            inventory::release(&mut tx, tier_id, quantity).await?;
        }

        tx.commit().await?;
        Ok(Transition::Applied)
    }

    async fn refund(&self, reference: &str) -> Result<Transition, AppError> {
        let mut tx = self.pool.begin().await?;

        let refunded: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET status = 'refunded', updated_at = NOW()
            WHERE reference = $1 AND status = 'success'
            RETURNING id
            "#,
        )
        .bind(reference)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order_id) = refunded else {
            return Ok(Transition::AlreadyProcessed);
        };

        sqlx::query(
            "UPDATE tickets SET status = 'cancelled' WHERE order_id = $1 AND status = 'active'",
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Transition::Applied)
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, AppError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM orders
            WHERE status = 'pending' AND NOT flagged_for_review AND created_at < $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn tickets_for_order(&self, order_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE order_id = $1 ORDER BY code",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn find_ticket(&self, code: &str) -> Result<Option<Ticket>, AppError> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn check_in(&self, code: &str) -> Result<Transition, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET status = 'used', used_at = NOW()
            WHERE code = $1 AND status = 'active'
            "#,
        )
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(Transition::from_rows_affected(result.rows_affected()))
    }
}
