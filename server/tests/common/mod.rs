#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use boxoffice_server::gateway::{self, GatewayStatus, GatewayTransaction, PaymentGateway};
use boxoffice_server::models::{Contact, Purchaser, TicketTier};
use boxoffice_server::orders::OrderService;
use boxoffice_server::pricing::{CartLine, FeeSchedule};
use boxoffice_server::store::{MemoryOrderStore, OrderStore};
use boxoffice_server::sweeper::SweeperConfig;
use boxoffice_server::tickets::TicketSigner;
use boxoffice_server::utils::error::AppError;

pub const WEBHOOK_SECRET: &str = "sk_test_webhook";
pub const TICKET_SECRET: &str = "gate-secret";

/// In-process gateway whose answers are set by the test.
#[derive(Default)]
pub struct ScriptedGateway {
    transactions: Mutex<HashMap<String, GatewayTransaction>>,
    fail_initialize: AtomicBool,
}

impl ScriptedGateway {
    pub async fn report(&self, reference: &str, status: GatewayStatus, amount_paid: i64) {
        self.transactions.lock().await.insert(
            reference.to_string(),
            GatewayTransaction {
                reference: reference.to_string(),
                status,
                amount_paid,
                channel: Some("card".to_string()),
                paid_at: Some(Utc::now()),
            },
        );
    }

    pub fn fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initialize_transaction(
        &self,
        reference: &str,
        _email: &str,
        _amount: i64,
    ) -> Result<String, AppError> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(AppError::ExternalServiceError("Gateway timed out".to_string()));
        }
        Ok(format!("https://checkout.test/{}", reference))
    }

    async fn verify_transaction(&self, reference: &str) -> Result<GatewayTransaction, AppError> {
        Ok(self
            .transactions
            .lock()
            .await
            .get(reference)
            .cloned()
            .unwrap_or_else(|| GatewayTransaction {
                reference: reference.to_string(),
                status: GatewayStatus::Pending,
                amount_paid: 0,
                channel: None,
                paid_at: None,
            }))
    }
}

pub struct Harness {
    pub store: Arc<MemoryOrderStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub service: Arc<OrderService>,
    pub event_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryOrderStore::new());
        let gateway = Arc::new(ScriptedGateway::default());
        let dyn_store: Arc<dyn OrderStore> = store.clone();
        let dyn_gateway: Arc<dyn PaymentGateway> = gateway.clone();
        let service = OrderService::new(
            dyn_store,
            dyn_gateway,
            FeeSchedule::default(),
            TicketSigner::new(TICKET_SECRET),
            WEBHOOK_SECRET,
        );
        Self {
            store,
            gateway,
            service: Arc::new(service),
            event_id: Uuid::new_v4(),
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn OrderStore> {
        self.store.clone()
    }

    pub async fn tier(&self, name: &str, unit_price: i64, capacity: i32) -> TicketTier {
        self.store
            .insert_tier(self.event_id, name, unit_price, capacity)
            .await
    }

    pub async fn reload(&self, tier: &TicketTier) -> TicketTier {
        self.store
            .get_tier(tier.id)
            .await
            .unwrap()
            .expect("tier exists")
    }

    pub fn line(&self, tier: &str, quantity: i32) -> CartLine {
        CartLine {
            event_id: self.event_id,
            tier_name: tier.to_string(),
            quantity,
        }
    }
}

pub fn guest(session: &str) -> Purchaser {
    Purchaser::Guest(session.to_string())
}

pub fn contact() -> Contact {
    Contact {
        name: "Ada Obi".to_string(),
        email: "ada@example.com".to_string(),
        phone: None,
    }
}

pub fn sweeper_config() -> SweeperConfig {
    SweeperConfig {
        interval: Duration::from_secs(60),
        reservation_ttl: Duration::from_secs(900),
        batch_size: 100,
    }
}

pub fn charge_success(reference: &str, amount: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": gateway::CHARGE_SUCCESS_EVENT,
        "data": {
            "reference": reference,
            "amount": amount,
            "status": "success",
            "channel": "card",
            "paid_at": "2026-03-14T18:30:00Z"
        }
    }))
    .unwrap()
}

pub fn sign(body: &[u8]) -> String {
    gateway::sign_webhook(WEBHOOK_SECRET.as_bytes(), body).unwrap()
}
