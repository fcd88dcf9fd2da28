use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    /// Minor currency units (kobo).
    pub unit_price: i64,
    pub capacity: i32,
    pub sold: i32,
    pub available: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketTier {
    /// `0 <= sold <= capacity` and `available == capacity - sold`.
    pub fn is_consistent(&self) -> bool {
        self.sold >= 0 && self.sold <= self.capacity && self.available == self.capacity - self.sold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Active,
    Used,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub code: String,
    pub order_id: Uuid,
    pub event_id: Uuid,
    pub tier_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub status: TicketStatus,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A ticket minted for one purchased unit, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub code: String,
    pub event_id: Uuid,
    pub tier_id: Uuid,
    pub buyer_id: Option<Uuid>,
}
