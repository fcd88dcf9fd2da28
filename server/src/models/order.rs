use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Fraud,
    Expired,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Success => "success",
            OrderStatus::Failed => "failed",
            OrderStatus::Fraud => "fraud",
            OrderStatus::Expired => "expired",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is buying: a signed-in user or an anonymous checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Purchaser {
    Buyer(Uuid),
    Guest(String),
}

impl Purchaser {
    pub fn buyer_id(&self) -> Option<Uuid> {
        match self {
            Purchaser::Buyer(id) => Some(*id),
            Purchaser::Guest(_) => None,
        }
    }

    pub fn guest_session_id(&self) -> Option<&str> {
        match self {
            Purchaser::Buyer(_) => None,
            Purchaser::Guest(session) => Some(session),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub reference: String,
    pub buyer_id: Option<Uuid>,
    pub guest_session_id: Option<String>,
    pub status: OrderStatus,
    pub subtotal: i64,
    pub service_fee: i64,
    pub vat_amount: i64,
    pub final_total: i64,
    pub gateway_fee: i64,
    pub platform_profit: i64,
    pub amount_paid: Option<i64>,
    pub payment_channel: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub webhook_attempts: i32,
    pub flagged_for_review: bool,
    pub review_reason: Option<String>,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn purchaser(&self) -> Option<Purchaser> {
        match (self.buyer_id, self.guest_session_id.as_ref()) {
            (Some(id), None) => Some(Purchaser::Buyer(id)),
            (None, Some(session)) => Some(Purchaser::Guest(session.clone())),
            _ => None,
        }
    }

    pub fn is_owned_by(&self, purchaser: &Purchaser) -> bool {
        self.purchaser().as_ref() == Some(purchaser)
    }
}

/// A cart line with its price frozen at order creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub event_id: Uuid,
    pub tier_id: Uuid,
    pub tier_name: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub subtotal: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderDetails {
    pub fn unit_count(&self) -> i32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchaser_serializes_with_kind_tag() {
        let guest = Purchaser::Guest("sess-1".to_string());
        let value = serde_json::to_value(&guest).unwrap();
        assert_eq!(value["kind"], "guest");
        assert_eq!(value["id"], "sess-1");
    }

    #[test]
    fn test_status_display_matches_storage_name() {
        assert_eq!(OrderStatus::Expired.to_string(), "expired");
        assert_eq!(
            serde_json::to_value(OrderStatus::Refunded).unwrap(),
            "refunded"
        );
    }
}
