//! In-process store with the same guarded-update semantics as Postgres.
//!
//! One mutex covers all state, so every trait call is a single critical
//! section: the in-memory analogue of a serialisable transaction.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{NewOrder, Notification, OrderStore, PaymentConfirmation};
use crate::inventory;
use crate::lifecycle::{self, Transition};
use crate::models::{
    NewTicket, Order, OrderDetails, OrderItem, OrderStatus, Ticket, TicketStatus, TicketTier,
};
use crate::utils::error::AppError;

#[derive(Default)]
struct State {
    tiers: HashMap<Uuid, TicketTier>,
    orders: HashMap<Uuid, Order>,
    references: HashMap<String, Uuid>,
    items: HashMap<Uuid, Vec<OrderItem>>,
    tickets: Vec<Ticket>,
    outbox: Vec<Notification>,
    webhook_failures: Vec<(Option<String>, String)>,
}

impl State {
    fn order_by_reference(&mut self, reference: &str) -> Option<&mut Order> {
        let id = self.references.get(reference)?;
        self.orders.get_mut(id)
    }

    /// Applies `op` to scratch copies of the touched tiers and writes them
    /// back only if every line succeeded.
    fn adjust_stock(
        &mut self,
        lines: &[(Uuid, i32)],
        op: fn(&mut TicketTier, i32) -> Result<(), AppError>,
    ) -> Result<(), AppError> {
        let mut touched: HashMap<Uuid, TicketTier> = HashMap::new();
        for &(tier_id, quantity) in lines {
            let tier = match touched.entry(tier_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let tier = self.tiers.get(&tier_id).cloned().ok_or_else(|| {
                        AppError::NotFound(format!("Ticket tier {} not found", tier_id))
                    })?;
                    entry.insert(tier)
                }
            };
            op(tier, quantity)?;
        }

        let now = Utc::now();
        for (id, mut tier) in touched {
            tier.updated_at = now;
            self.tiers.insert(id, tier);
        }
        Ok(())
    }

    fn details(&self, order: &Order) -> OrderDetails {
        OrderDetails {
            order: order.clone(),
            items: self.items.get(&order.id).cloned().unwrap_or_default(),
        }
    }
}

#[derive(Default)]
pub struct MemoryOrderStore {
    state: Mutex<State>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_tier(
        &self,
        event_id: Uuid,
        name: &str,
        unit_price: i64,
        capacity: i32,
    ) -> TicketTier {
        let now = Utc::now();
        let tier = TicketTier {
            id: Uuid::new_v4(),
            event_id,
            name: name.to_string(),
            unit_price,
            capacity,
            sold: 0,
            available: capacity,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.tiers.insert(tier.id, tier.clone());
        tier
    }

    /// Simulates the event owner repricing a tier.
    pub async fn set_unit_price(&self, tier_id: Uuid, unit_price: i64) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let tier = state
            .tiers
            .get_mut(&tier_id)
            .ok_or_else(|| AppError::NotFound(format!("Ticket tier {} not found", tier_id)))?;
        tier.unit_price = unit_price;
        tier.updated_at = Utc::now();
        Ok(())
    }

    /// Shifts an order's creation time, for abandonment tests.
    pub async fn backdate_order(&self, reference: &str, created_at: DateTime<Utc>) {
        if let Some(order) = self.state.lock().await.order_by_reference(reference) {
            order.created_at = created_at;
        }
    }

    pub async fn outbox(&self) -> Vec<Notification> {
        self.state.lock().await.outbox.clone()
    }

    pub async fn webhook_failures(&self) -> Vec<(Option<String>, String)> {
        self.state.lock().await.webhook_failures.clone()
    }

    pub async fn ticket_count(&self) -> usize {
        self.state.lock().await.tickets.len()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_tier(&self, event_id: Uuid, name: &str) -> Result<Option<TicketTier>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .tiers
            .values()
            .find(|tier| tier.event_id == event_id && tier.name == name)
            .cloned())
    }

    async fn get_tier(&self, tier_id: Uuid) -> Result<Option<TicketTier>, AppError> {
        Ok(self.state.lock().await.tiers.get(&tier_id).cloned())
    }

    async fn create_order(&self, new_order: NewOrder) -> Result<OrderDetails, AppError> {
        let mut state = self.state.lock().await;

        if state.references.contains_key(&new_order.reference) {
            return Err(AppError::InternalServerError(format!(
                "Order reference collision: {}",
                new_order.reference
            )));
        }

        let lines: Vec<(Uuid, i32)> = new_order
            .items
            .iter()
            .map(|line| (line.tier_id, line.quantity))
            .collect();
        state.adjust_stock(&lines, inventory::reserve_in_place)?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            reference: new_order.reference.clone(),
            buyer_id: new_order.purchaser.buyer_id(),
            guest_session_id: new_order.purchaser.guest_session_id().map(str::to_string),
            status: OrderStatus::Pending,
            subtotal: new_order.fees.subtotal,
            service_fee: new_order.fees.service_fee,
            vat_amount: new_order.fees.vat_amount,
            final_total: new_order.fees.final_total,
            gateway_fee: new_order.fees.gateway_fee,
            platform_profit: new_order.fees.platform_profit,
            amount_paid: None,
            payment_channel: None,
            paid_at: None,
            webhook_attempts: 0,
            flagged_for_review: false,
            review_reason: None,
            contact_name: new_order.contact.name.clone(),
            contact_email: new_order.contact.email.clone(),
            contact_phone: new_order.contact.phone.clone(),
            created_at: now,
            updated_at: now,
        };

        let items: Vec<OrderItem> = new_order
            .items
            .iter()
            .map(|line| OrderItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                event_id: line.event_id,
                tier_id: line.tier_id,
                tier_name: line.tier_name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                subtotal: line.subtotal,
            })
            .collect();

        state.references.insert(order.reference.clone(), order.id);
        state.items.insert(order.id, items.clone());
        state.orders.insert(order.id, order.clone());

        Ok(OrderDetails { order, items })
    }

    async fn find_order(&self, reference: &str) -> Result<Option<OrderDetails>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .references
            .get(reference)
            .and_then(|id| state.orders.get(id))
            .map(|order| state.details(order)))
    }

    async fn record_webhook_attempt(&self, reference: &str) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        match state.order_by_reference(reference) {
            Some(order) => {
                order.webhook_attempts += 1;
                order.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_webhook_failure(
        &self,
        reference: Option<&str>,
        reason: &str,
    ) -> Result<(), AppError> {
        self.state
            .lock()
            .await
            .webhook_failures
            .push((reference.map(str::to_string), reason.to_string()));
        Ok(())
    }

    async fn flag_for_review(
        &self,
        reference: &str,
        amount_paid: i64,
        reason: &str,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if let Some(order) = state.order_by_reference(reference) {
            if lifecycle::can_transition(order.status, OrderStatus::Success) {
                order.flagged_for_review = true;
                order.review_reason = Some(reason.to_string());
                order.amount_paid = Some(amount_paid);
                order.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn confirm_payment(
        &self,
        reference: &str,
        confirmation: PaymentConfirmation,
        tickets: Vec<NewTicket>,
        notification: Notification,
    ) -> Result<Transition, AppError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let order_id = match state.order_by_reference(reference) {
            Some(order) if lifecycle::can_transition(order.status, OrderStatus::Success) => {
                order.status = OrderStatus::Success;
                order.amount_paid = Some(confirmation.amount_paid);
                order.payment_channel = confirmation.channel;
                order.paid_at = Some(confirmation.paid_at);
                order.updated_at = now;
                order.id
            }
            _ => return Ok(Transition::AlreadyProcessed),
        };

        for ticket in tickets {
            state.tickets.push(Ticket {
                id: Uuid::new_v4(),
                code: ticket.code,
                order_id,
                event_id: ticket.event_id,
                tier_id: ticket.tier_id,
                buyer_id: ticket.buyer_id,
                status: TicketStatus::Active,
                used_at: None,
                created_at: now,
            });
        }
        state.outbox.push(notification);

        Ok(Transition::Applied)
    }

    async fn close_pending(&self, order_id: Uuid, to: OrderStatus) -> Result<Transition, AppError> {
        lifecycle::ensure_closing(to)?;
        let mut state = self.state.lock().await;

        match state.orders.get(&order_id) {
            Some(order) if lifecycle::can_transition(order.status, to) => {}
            _ => return Ok(Transition::AlreadyProcessed),
        }

        let lines: Vec<(Uuid, i32)> = state
            .items
            .get(&order_id)
            .map(|items| items.iter().map(|i| (i.tier_id, i.quantity)).collect())
            .unwrap_or_default();
        state.adjust_stock(&lines, inventory::release_in_place)?;

        let now = Utc::now();
        if let Some(order) = state.orders.get_mut(&order_id) {
            order.status = to;
            order.updated_at = now;
        }

        Ok(Transition::Applied)
    }

    async fn refund(&self, reference: &str) -> Result<Transition, AppError> {
        let mut state = self.state.lock().await;

        let order_id = match state.order_by_reference(reference) {
            Some(order) if order.status == OrderStatus::Success => {
                order.status = OrderStatus::Refunded;
                order.updated_at = Utc::now();
                order.id
            }
            _ => return Ok(Transition::AlreadyProcessed),
        };

        for ticket in state
            .tickets
            .iter_mut()
            .filter(|t| t.order_id == order_id && t.status == TicketStatus::Active)
        {
            ticket.status = TicketStatus::Cancelled;
        }

        Ok(Transition::Applied)
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, AppError> {
        let state = self.state.lock().await;
        let mut stale: Vec<&Order> = state
            .orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::Pending && !o.flagged_for_review && o.created_at < cutoff
            })
            .collect();
        stale.sort_by_key(|o| o.created_at);
        Ok(stale
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|o| o.id)
            .collect())
    }

    async fn tickets_for_order(&self, order_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        let state = self.state.lock().await;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(tickets)
    }

    async fn find_ticket(&self, code: &str) -> Result<Option<Ticket>, AppError> {
        let state = self.state.lock().await;
        Ok(state.tickets.iter().find(|t| t.code == code).cloned())
    }

    async fn check_in(&self, code: &str) -> Result<Transition, AppError> {
        let mut state = self.state.lock().await;
        match state
            .tickets
            .iter_mut()
            .find(|t| t.code == code && t.status == TicketStatus::Active)
        {
            Some(ticket) => {
                ticket.status = TicketStatus::Used;
                ticket.used_at = Some(Utc::now());
                Ok(Transition::Applied)
            }
            None => Ok(Transition::AlreadyProcessed),
        }
    }
}
