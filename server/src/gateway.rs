//! Payment gateway adapter (Paystack-style API).
//!
//! Outbound calls never touch local state: the order engine reads what the
//! gateway reports and only then performs its own guarded transition, so a
//! timeout here leaves nothing half-applied.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha512;

use crate::utils::error::AppError;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";
pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Success,
    Failed,
    Abandoned,
    Pending,
}

impl GatewayStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "success" => GatewayStatus::Success,
            "failed" | "reversed" => GatewayStatus::Failed,
            "abandoned" => GatewayStatus::Abandoned,
            _ => GatewayStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayTransaction {
    pub reference: String,
    pub status: GatewayStatus,
    pub amount_paid: i64,
    pub channel: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a checkout for `amount` minor units and returns the redirect URL.
    async fn initialize_transaction(
        &self,
        reference: &str,
        email: &str,
        amount: i64,
    ) -> Result<String, AppError>;

    async fn verify_transaction(&self, reference: &str) -> Result<GatewayTransaction, AppError>;
}

/// Checks `signature_hex` against `HMAC-SHA512(secret, raw_body)` in
/// constant time. Must run before the body is parsed.
pub fn verify_webhook_signature(
    secret: &[u8],
    raw_body: &[u8],
    signature_hex: &str,
) -> Result<(), AppError> {
    let expected = hex::decode(signature_hex.trim()).map_err(|_| AppError::InvalidSignature)?;
    let mut mac = HmacSha512::new_from_slice(secret).map_err(|_| AppError::InvalidSignature)?;
    mac.update(raw_body);
    mac.verify_slice(&expected)
        .map_err(|_| AppError::InvalidSignature)
}

pub fn sign_webhook(secret: &[u8], raw_body: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha512::new_from_slice(secret)
        .map_err(|e| AppError::InternalServerError(format!("Invalid webhook key: {}", e)))?;
    mac.update(raw_body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub reference: String,
    pub amount: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    pub fn transaction(&self) -> GatewayTransaction {
        let status = match (&self.data.status, self.event.as_str()) {
            (Some(raw), _) => GatewayStatus::parse(raw),
            (None, CHARGE_SUCCESS_EVENT) => GatewayStatus::Success,
            (None, _) => GatewayStatus::Pending,
        };
        GatewayTransaction {
            reference: self.data.reference.clone(),
            status,
            amount_paid: self.data.amount,
            channel: self.data.channel.clone(),
            paid_at: self.data.paid_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    reference: String,
    status: String,
    amount: i64,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    paid_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct PaystackGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    callback_url: String,
}

impl PaystackGateway {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        callback_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::InternalServerError(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            callback_url: callback_url.into(),
        })
    }

    async fn read_envelope<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let http_status = response.status();
        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("Unreadable gateway response ({}): {}", http_status, e))
        })?;

        if !http_status.is_success() || !envelope.status {
            return Err(AppError::ExternalServiceError(format!(
                "Gateway rejected request ({}): {}",
                http_status, envelope.message
            )));
        }
        envelope
            .data
            .ok_or_else(|| AppError::ExternalServiceError("Gateway response has no data".to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::ExternalServiceError("Gateway timed out".to_string())
    } else {
        AppError::ExternalServiceError(format!("Gateway unreachable: {}", e))
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize_transaction(
        &self,
        reference: &str,
        email: &str,
        amount: i64,
    ) -> Result<String, AppError> {
        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "reference": reference,
                "email": email,
                "amount": amount,
                "callback_url": self.callback_url,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let data: InitializeData = Self::read_envelope(response).await?;
        Ok(data.authorization_url)
    }

    async fn verify_transaction(&self, reference: &str) -> Result<GatewayTransaction, AppError> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(transport_error)?;

        let data: VerifyData = Self::read_envelope(response).await?;
        Ok(GatewayTransaction {
            status: GatewayStatus::parse(&data.status),
            reference: data.reference,
            amount_paid: data.amount,
            channel: data.channel,
            paid_at: data.paid_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"sk_test_webhook";

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"event":"charge.success","data":{"reference":"BOX-1","amount":440000}}"#;
        let signature = sign_webhook(SECRET, body).unwrap();
        assert!(verify_webhook_signature(SECRET, body, &signature).is_ok());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let body = br#"{"event":"charge.success","data":{"reference":"BOX-1","amount":440000}}"#;
        let signature = sign_webhook(SECRET, body).unwrap();
        let tampered = br#"{"event":"charge.success","data":{"reference":"BOX-1","amount":1}}"#;
        assert!(matches!(
            verify_webhook_signature(SECRET, tampered, &signature),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn test_malformed_signature_is_rejected() {
        assert!(matches!(
            verify_webhook_signature(SECRET, b"{}", "not-hex"),
            Err(AppError::InvalidSignature)
        ));
        assert!(matches!(
            verify_webhook_signature(SECRET, b"{}", ""),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(GatewayStatus::parse("success"), GatewayStatus::Success);
        assert_eq!(GatewayStatus::parse("FAILED"), GatewayStatus::Failed);
        assert_eq!(GatewayStatus::parse("abandoned"), GatewayStatus::Abandoned);
        assert_eq!(GatewayStatus::parse("ongoing"), GatewayStatus::Pending);
    }

    #[test]
    fn test_webhook_event_without_status_uses_event_name() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{"event":"charge.success","data":{"reference":"BOX-9","amount":1500,"channel":"card"}}"#,
        )
        .unwrap();
        let tx = event.transaction();
        assert_eq!(tx.status, GatewayStatus::Success);
        assert_eq!(tx.amount_paid, 1500);
        assert_eq!(tx.channel.as_deref(), Some("card"));
    }
}
