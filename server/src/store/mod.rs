//! Persistence seam for the order engine.
//!
//! Every method is one atomic unit: either all of its writes land or none do.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::lifecycle::Transition;
use crate::models::{
    Contact, NewTicket, OrderDetails, OrderStatus, Purchaser, Ticket, TicketTier,
};
use crate::pricing::FeeBreakdown;
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub event_id: Uuid,
    pub tier_id: Uuid,
    pub tier_name: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub subtotal: i64,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub reference: String,
    pub purchaser: Purchaser,
    pub contact: Contact,
    pub fees: FeeBreakdown,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub amount_paid: i64,
    pub channel: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// Outbound message for the notification dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipient: String,
    pub template: String,
    pub payload: Value,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_tier(&self, event_id: Uuid, name: &str) -> Result<Option<TicketTier>, AppError>;

    async fn get_tier(&self, tier_id: Uuid) -> Result<Option<TicketTier>, AppError>;

    /// Reserves every item and persists the `pending` order in one transaction.
    async fn create_order(&self, order: NewOrder) -> Result<OrderDetails, AppError>;

    async fn find_order(&self, reference: &str) -> Result<Option<OrderDetails>, AppError>;

    /// Returns `false` when the reference is unknown.
    async fn record_webhook_attempt(&self, reference: &str) -> Result<bool, AppError>;

    async fn record_webhook_failure(
        &self,
        reference: Option<&str>,
        reason: &str,
    ) -> Result<(), AppError>;

    /// Marks a pending order for manual review without changing its status.
    async fn flag_for_review(
        &self,
        reference: &str,
        amount_paid: i64,
        reason: &str,
    ) -> Result<(), AppError>;

    /// Guarded `pending -> success`. Tickets and the notification are written
    /// only when the guard applies.
    async fn confirm_payment(
        &self,
        reference: &str,
        confirmation: PaymentConfirmation,
        tickets: Vec<NewTicket>,
        notification: Notification,
    ) -> Result<Transition, AppError>;

    /// Guarded `pending -> failed | expired | fraud`, releasing the order's
    /// stock only when the guard applies.
    async fn close_pending(&self, order_id: Uuid, to: OrderStatus) -> Result<Transition, AppError>;

    /// Guarded `success -> refunded`; cancels the order's active tickets.
    async fn refund(&self, reference: &str) -> Result<Transition, AppError>;

    /// Unflagged pending orders created before `cutoff`, oldest first.
    async fn stale_pending(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, AppError>;

    async fn tickets_for_order(&self, order_id: Uuid) -> Result<Vec<Ticket>, AppError>;

    async fn find_ticket(&self, code: &str) -> Result<Option<Ticket>, AppError>;

    /// Guarded `active -> used`.
    async fn check_in(&self, code: &str) -> Result<Transition, AppError>;
}
