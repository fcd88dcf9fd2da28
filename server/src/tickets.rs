//! Ticket codes that gate hardware can authenticate without a network.
//!
//! A code reads `TKT-<reference>-<tier tag>-<unit>-<signature>`, where the
//! signature is the first 8 bytes of `HMAC-SHA256(secret, body)` in hex and
//! `body` is everything before the final dash. Whether the ticket has been
//! used or cancelled still needs a store lookup.

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::models::{NewTicket, OrderDetails};
use crate::utils::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const CODE_PREFIX: &str = "TKT";
const SIGNATURE_BYTES: usize = 8;
const TIER_TAG_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketClaims {
    pub reference: String,
    pub tier_tag: String,
    pub unit: u32,
}

#[derive(Clone)]
pub struct TicketSigner {
    secret: Vec<u8>,
}

impl TicketSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, AppError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::InternalServerError(format!("Invalid ticket signing key: {}", e)))
    }

    pub fn tier_tag(tier_id: Uuid) -> String {
        tier_id.simple().to_string()[..TIER_TAG_LEN].to_uppercase()
    }

    pub fn sign(&self, reference: &str, tier_id: Uuid, unit: u32) -> Result<String, AppError> {
        let body = format!(
            "{}-{}-{}-{:03}",
            CODE_PREFIX,
            reference,
            Self::tier_tag(tier_id),
            unit
        );
        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        let digest = mac.finalize().into_bytes();
        Ok(format!("{}-{}", body, hex::encode(&digest[..SIGNATURE_BYTES])))
    }

    /// One ticket per purchased unit, numbered across the whole order.
    pub fn mint(&self, details: &OrderDetails) -> Result<Vec<NewTicket>, AppError> {
        let mut tickets = Vec::with_capacity(details.unit_count().max(0) as usize);
        let mut unit = 1u32;
        for item in &details.items {
            for _ in 0..item.quantity {
                tickets.push(NewTicket {
                    code: self.sign(&details.order.reference, item.tier_id, unit)?,
                    event_id: item.event_id,
                    tier_id: item.tier_id,
                    buyer_id: details.order.buyer_id,
                });
                unit += 1;
            }
        }
        Ok(tickets)
    }

    /// Recomputes the signature; no store access.
    pub fn verify(&self, code: &str) -> Option<TicketClaims> {
        let (body, signature) = code.rsplit_once('-')?;
        // Uppercase hex would decode to the same bytes; only the canonical form is valid.
        if !signature.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return None;
        }
        let signature = hex::decode(signature).ok()?;
        if signature.len() != SIGNATURE_BYTES {
            return None;
        }

        let mut mac = self.mac().ok()?;
        mac.update(body.as_bytes());
        mac.verify_truncated_left(&signature).ok()?;

        let rest = body.strip_prefix(CODE_PREFIX)?.strip_prefix('-')?;
        let (rest, unit) = rest.rsplit_once('-')?;
        let (reference, tier_tag) = rest.rsplit_once('-')?;
        Some(TicketClaims {
            reference: reference.to_string(),
            tier_tag: tier_tag.to_string(),
            unit: unit.parse().ok()?,
        })
    }
}
