//! The order engine's public operations.
//!
//! Buyer polling, webhook delivery and the sweeper may all race on the same
//! order. None of them coordinate with each other: each calls a guarded store
//! transition and treats `Transition::AlreadyProcessed` as a finished job, so
//! exactly one of them produces a consequence (tickets or released stock).

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::gateway::{self, GatewayStatus, GatewayTransaction, PaymentGateway, WebhookEvent};
use crate::lifecycle::{self, Transition};
use crate::models::{Contact, OrderDetails, OrderStatus, Purchaser, Ticket, TicketStatus};
use crate::pricing::{self, CartLine, FeeBreakdown, FeeSchedule};
use crate::store::{NewOrder, NewOrderItem, Notification, OrderStore, PaymentConfirmation};
use crate::tickets::{TicketClaims, TicketSigner};
use crate::utils::error::AppError;

const REFERENCE_PREFIX: &str = "BOX-";
const REFERENCE_LEN: usize = 20;
const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CONFIRMATION_TEMPLATE: &str = "order_confirmation";

pub fn generate_reference() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..REFERENCE_LEN)
        .map(|_| REFERENCE_CHARSET[rng.gen_range(0..REFERENCE_CHARSET.len())] as char)
        .collect();
    format!("{}{}", REFERENCE_PREFIX, suffix)
}

pub fn validate_contact(contact: &Contact) -> Result<(), AppError> {
    if contact.name.trim().is_empty() {
        return Err(AppError::ValidationError("Name is required".to_string()));
    }
    let valid_email = contact
        .email
        .trim()
        .split_once('@')
        .map(|(user, domain)| !user.is_empty() && !domain.is_empty() && !domain.contains('@'))
        .unwrap_or(false);
    if !valid_email {
        return Err(AppError::ValidationError(
            "A valid email address is required".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializedOrder {
    pub reference: String,
    pub final_total: i64,
    pub authorization_url: String,
    pub fees: FeeBreakdown,
}

/// What a gateway report did to the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "transition")]
pub enum Settlement {
    Paid(Transition),
    Failed(Transition),
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Confirmed,
    AlreadyProcessed,
    Closed,
    Pending,
    Ignored,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

impl WebhookAck {
    fn new(outcome: WebhookOutcome) -> Self {
        Self {
            received: true,
            outcome,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckIn {
    pub transition: Transition,
    pub ticket: Ticket,
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    fees: FeeSchedule,
    signer: TicketSigner,
    webhook_secret: Vec<u8>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        fees: FeeSchedule,
        signer: TicketSigner,
        webhook_secret: impl AsRef<[u8]>,
    ) -> Self {
        Self {
            store,
            gateway,
            fees,
            signer,
            webhook_secret: webhook_secret.as_ref().to_vec(),
        }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub async fn initialize_order(
        &self,
        purchaser: Purchaser,
        contact: Contact,
        cart: Vec<CartLine>,
    ) -> Result<InitializedOrder, AppError> {
        validate_contact(&contact)?;
        pricing::validate_cart(&cart)?;

        let quote = pricing::quote(self.store.as_ref(), &self.fees, &cart).await?;
        let reference = generate_reference();

        let items = quote
            .lines
            .iter()
            .map(|line| NewOrderItem {
                event_id: line.tier.event_id,
                tier_id: line.tier.id,
                tier_name: line.tier.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                subtotal: line.subtotal,
            })
            .collect();

        let details = self
            .store
            .create_order(NewOrder {
                reference: reference.clone(),
                purchaser,
                contact: Contact {
                    name: contact.name.trim().to_string(),
                    email: contact.email.trim().to_string(),
                    phone: contact.phone.clone(),
                },
                fees: quote.fees,
                items,
            })
            .await?;

        info!(
            reference = %reference,
            order_id = %details.order.id,
            final_total = quote.fees.final_total,
            units = details.unit_count(),
            "Order reserved"
        );

        let authorization_url = match self
            .gateway
            .initialize_transaction(&reference, &details.order.contact_email, quote.fees.final_total)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                // No checkout was opened, so the reservation can never be paid for.
                warn!(reference = %reference, error = %e, "Gateway initialization failed, releasing stock");
                self.store
                    .close_pending(details.order.id, OrderStatus::Failed)
                    .await?;
                return Err(e);
            }
        };

        Ok(InitializedOrder {
            reference,
            final_total: quote.fees.final_total,
            authorization_url,
            fees: quote.fees,
        })
    }

    async fn load(&self, reference: &str) -> Result<OrderDetails, AppError> {
        self.store
            .find_order(reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order '{}' not found", reference)))
    }

    pub async fn get_order(
        &self,
        reference: &str,
        purchaser: &Purchaser,
    ) -> Result<OrderDetails, AppError> {
        let details = self.load(reference).await?;
        if !details.order.is_owned_by(purchaser) {
            return Err(AppError::Unauthorized(
                "This order belongs to another purchaser".to_string(),
            ));
        }
        Ok(details)
    }

    pub async fn tickets(&self, reference: &str, purchaser: &Purchaser) -> Result<Vec<Ticket>, AppError> {
        let details = self.get_order(reference, purchaser).await?;
        self.store.tickets_for_order(details.order.id).await
    }

    /// Synchronous confirmation: asks the gateway, then applies the answer.
    pub async fn verify_payment(&self, reference: &str) -> Result<OrderDetails, AppError> {
        let details = self.load(reference).await?;
        let status = details.order.status;
        if status == OrderStatus::Success || lifecycle::is_terminal(status) {
            debug!(reference = %reference, status = %status, "Order already settled");
            return Ok(details);
        }

        let transaction = self.gateway.verify_transaction(reference).await?;
        if transaction.reference != reference {
            return Err(AppError::ExternalServiceError(format!(
                "Gateway answered for '{}' instead of '{}'",
                transaction.reference, reference
            )));
        }

        self.settle(&details, &transaction).await?;
        self.load(reference).await
    }

    async fn settle(
        &self,
        details: &OrderDetails,
        transaction: &GatewayTransaction,
    ) -> Result<Settlement, AppError> {
        let order = &details.order;
        match transaction.status {
            GatewayStatus::Success => {
                if transaction.amount_paid != order.final_total {
                    let reason = format!(
                        "gateway reported {} against a total of {}",
                        transaction.amount_paid, order.final_total
                    );
                    warn!(reference = %order.reference, %reason, "Amount mismatch, flagging for review");
                    self.store
                        .flag_for_review(&order.reference, transaction.amount_paid, &reason)
                        .await?;
                    return Err(AppError::AmountMismatch {
                        expected: order.final_total,
                        paid: transaction.amount_paid,
                    });
                }

                let tickets = self.signer.mint(details)?;
                let notification = Notification {
                    recipient: order.contact_email.clone(),
                    template: CONFIRMATION_TEMPLATE.to_string(),
                    payload: json!({
                        "reference": order.reference,
                        "name": order.contact_name,
                        "final_total": order.final_total,
                        "tickets": tickets.iter().map(|t| t.code.as_str()).collect::<Vec<_>>(),
                    }),
                };
                let issued = tickets.len();

                let transition = self
                    .store
                    .confirm_payment(
                        &order.reference,
                        PaymentConfirmation {
                            amount_paid: transaction.amount_paid,
                            channel: transaction.channel.clone(),
                            paid_at: transaction.paid_at.unwrap_or_else(Utc::now),
                        },
                        tickets,
                        notification,
                    )
                    .await?;

                match transition {
                    Transition::Applied => {
                        info!(reference = %order.reference, tickets = issued, "Payment confirmed");
                    }
                    Transition::AlreadyProcessed => {
                        self.report_late_payment(&order.reference).await?;
                    }
                }
                Ok(Settlement::Paid(transition))
            }
            GatewayStatus::Failed => {
                let transition = self.store.close_pending(order.id, OrderStatus::Failed).await?;
                info!(reference = %order.reference, ?transition, "Payment failed");
                Ok(Settlement::Failed(transition))
            }
            // An abandoned checkout can still be resumed, so it waits for the sweeper.
            GatewayStatus::Abandoned | GatewayStatus::Pending => {
                debug!(reference = %order.reference, status = ?transaction.status, "Payment not final yet");
                Ok(Settlement::Pending)
            }
        }
    }

    async fn report_late_payment(&self, reference: &str) -> Result<(), AppError> {
        let current = self.load(reference).await?.order.status;
        if current == OrderStatus::Success {
            debug!(reference = %reference, "Payment already confirmed");
        } else {
            error!(
                reference = %reference,
                status = %current,
                "Gateway confirmed payment for a closed order, refund required"
            );
        }
        Ok(())
    }

    /// Always acknowledges a correctly signed delivery; processing failures
    /// are recorded instead of being bounced back to the gateway.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, AppError> {
        let signature = signature.ok_or(AppError::InvalidSignature)?;
        gateway::verify_webhook_signature(&self.webhook_secret, raw_body, signature).map_err(|e| {
            warn!("Rejected webhook with invalid signature");
            e
        })?;

        let event: WebhookEvent = match serde_json::from_slice(raw_body) {
            Ok(event) => event,
            Err(e) => {
                self.record_failure(None, &format!("unparseable payload: {}", e))
                    .await;
                return Ok(WebhookAck::new(WebhookOutcome::Failed));
            }
        };
        let reference = event.data.reference.as_str();

        match self.store.record_webhook_attempt(reference).await {
            Ok(true) => {}
            Ok(false) => {
                self.record_failure(Some(reference), "unknown reference").await;
                return Ok(WebhookAck::new(WebhookOutcome::Ignored));
            }
            Err(e) => {
                self.record_failure(Some(reference), &e.to_string()).await;
                return Ok(WebhookAck::new(WebhookOutcome::Failed));
            }
        }

        if event.event != gateway::CHARGE_SUCCESS_EVENT {
            debug!(reference = %reference, event = %event.event, "Ignoring webhook event");
            return Ok(WebhookAck::new(WebhookOutcome::Ignored));
        }

        let outcome = match self.load(reference).await {
            Ok(details) => match self.settle(&details, &event.transaction()).await {
                Ok(Settlement::Paid(Transition::Applied)) => WebhookOutcome::Confirmed,
                Ok(Settlement::Failed(Transition::Applied)) => WebhookOutcome::Closed,
                Ok(Settlement::Paid(Transition::AlreadyProcessed))
                | Ok(Settlement::Failed(Transition::AlreadyProcessed)) => {
                    WebhookOutcome::AlreadyProcessed
                }
                Ok(Settlement::Pending) => WebhookOutcome::Pending,
                Err(e) => {
                    self.record_failure(Some(reference), &e.to_string()).await;
                    WebhookOutcome::Failed
                }
            },
            Err(e) => {
                self.record_failure(Some(reference), &e.to_string()).await;
                WebhookOutcome::Failed
            }
        };

        Ok(WebhookAck::new(outcome))
    }

    async fn record_failure(&self, reference: Option<&str>, reason: &str) {
        warn!(reference = ?reference, %reason, "Webhook processing failed");
        if let Err(e) = self.store.record_webhook_failure(reference, reason).await {
            error!(error = %e, "Could not record webhook failure");
        }
    }

    /// Administrative `success -> refunded`. Stock is not returned.
    pub async fn refund_order(&self, reference: &str) -> Result<Transition, AppError> {
        let details = self.load(reference).await?;
        if lifecycle::check_reachable(details.order.status, OrderStatus::Refunded)?
            == Transition::AlreadyProcessed
        {
            return Ok(Transition::AlreadyProcessed);
        }
        let transition = self.store.refund(reference).await?;
        info!(reference = %reference, ?transition, "Refund recorded");
        Ok(transition)
    }

    /// Administrative `pending -> fraud`, releasing the reservation.
    pub async fn mark_fraud(&self, reference: &str) -> Result<Transition, AppError> {
        let details = self.load(reference).await?;
        if lifecycle::check_reachable(details.order.status, OrderStatus::Fraud)?
            == Transition::AlreadyProcessed
        {
            return Ok(Transition::AlreadyProcessed);
        }
        let transition = self
            .store
            .close_pending(details.order.id, OrderStatus::Fraud)
            .await?;
        warn!(reference = %reference, ?transition, "Order marked as fraud");
        Ok(transition)
    }

    pub fn verify_ticket(&self, code: &str) -> Result<TicketClaims, AppError> {
        self.signer.verify(code).ok_or(AppError::InvalidSignature)
    }

    /// Gate check-in: offline authenticity first, then a guarded `active -> used`.
    pub async fn check_in(&self, code: &str) -> Result<CheckIn, AppError> {
        self.verify_ticket(code)?;

        let ticket = self
            .store
            .find_ticket(code)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;
        if ticket.status == TicketStatus::Cancelled {
            return Err(AppError::ValidationError(
                "Ticket has been cancelled".to_string(),
            ));
        }

        let transition = self.store.check_in(code).await?;
        let ticket = self
            .store
            .find_ticket(code)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;
        Ok(CheckIn { transition, ticket })
    }
}
