//! Authoritative order pricing.
//!
//! Prices always come from the live tier rows; whatever the client believes a
//! ticket costs is never read. All amounts are integer minor units and all
//! rates are basis points (10000 = 100%).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::TicketTier;
use crate::store::OrderStore;
use crate::utils::error::AppError;

const BPS_DENOMINATOR: i128 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Subtotals at or below this use the small-ticket rate.
    pub threshold: i64,
    pub small_rate_bps: i64,
    pub premium_rate_bps: i64,
    pub premium_flat_fee: i64,
    pub vat_rate_bps: i64,
    pub gateway_fee_bps: i64,
    pub gateway_fee_flat: i64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            threshold: 500_000,
            small_rate_bps: 1_000,
            premium_rate_bps: 700,
            premium_flat_fee: 5_000,
            vat_rate_bps: 750,
            gateway_fee_bps: 150,
            gateway_fee_flat: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub subtotal: i64,
    pub service_fee: i64,
    pub vat_amount: i64,
    pub final_total: i64,
    /// Estimated processor cut; bookkeeping only, never charged to the buyer.
    pub gateway_fee: i64,
    pub platform_profit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub event_id: Uuid,
    pub tier_name: String,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct PricedLine {
    pub tier: TicketTier,
    pub quantity: i32,
    pub unit_price: i64,
    pub subtotal: i64,
}

#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub lines: Vec<PricedLine>,
    pub fees: FeeBreakdown,
}

/// `round(amount * bps / 10000)` with halves rounded up.
pub fn apply_bps(amount: i64, bps: i64) -> i64 {
    let scaled = amount as i128 * bps as i128;
    ((scaled + BPS_DENOMINATOR / 2).div_euclid(BPS_DENOMINATOR)) as i64
}

impl FeeSchedule {
    pub fn breakdown(&self, subtotal: i64) -> FeeBreakdown {
        let (service_fee, vat_amount) = if subtotal <= self.threshold {
            (apply_bps(subtotal, self.small_rate_bps), 0)
        } else {
            let fee = apply_bps(subtotal, self.premium_rate_bps) + self.premium_flat_fee;
            (fee, apply_bps(fee, self.vat_rate_bps))
        };
        let final_total = subtotal + service_fee + vat_amount;

        let gateway_fee = apply_bps(final_total, self.gateway_fee_bps) + self.gateway_fee_flat;

        FeeBreakdown {
            subtotal,
            service_fee,
            vat_amount,
            final_total,
            gateway_fee,
            platform_profit: service_fee + vat_amount - gateway_fee,
        }
    }
}

/// Rejects malformed carts before anything touches inventory. Quantities
/// are only bounded below; stock is the upper bound.
pub fn validate_cart(cart: &[CartLine]) -> Result<(), AppError> {
    if cart.is_empty() {
        return Err(AppError::ValidationError("Cart is empty".to_string()));
    }

    for line in cart {
        let name = line.tier_name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError(
                "Tier name is required".to_string(),
            ));
        }
        if line.quantity < 1 {
            return Err(AppError::ValidationError(format!(
                "Quantity for '{}' must be at least 1",
                name
            )));
        }
    }
    Ok(())
}

/// Prices a validated cart against the current tier rows. Read-only.
///
/// Tier lookup is exact on the name, so duplicates are detected on the
/// resolved tier rather than on the spelling the client sent.
pub async fn quote(
    store: &dyn OrderStore,
    schedule: &FeeSchedule,
    cart: &[CartLine],
) -> Result<PriceQuote, AppError> {
    let mut seen = HashSet::new();
    let mut lines = Vec::with_capacity(cart.len());
    for line in cart {
        let tier_name = line.tier_name.trim();
        let tier = store
            .find_tier(line.event_id, tier_name)
            .await?
            .ok_or_else(|| {
                AppError::ValidationError(format!(
                    "Tier '{}' does not exist for event {}",
                    tier_name, line.event_id
                ))
            })?;
        if !seen.insert(tier.id) {
            return Err(AppError::ValidationError(format!(
                "Tier '{}' appears more than once",
                tier.name
            )));
        }
        lines.push((tier, line.quantity));
    }
    price_lines(lines, schedule)
}

pub fn price_lines(
    lines: Vec<(TicketTier, i32)>,
    schedule: &FeeSchedule,
) -> Result<PriceQuote, AppError> {
    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal = 0i64;

    for (tier, quantity) in lines {
        if quantity > tier.available {
            return Err(AppError::InsufficientStock {
                tier: tier.name.clone(),
                requested: quantity,
                available: tier.available,
            });
        }
        let line_subtotal = tier.unit_price * i64::from(quantity);
        subtotal += line_subtotal;
        priced.push(PricedLine {
            unit_price: tier.unit_price,
            subtotal: line_subtotal,
            quantity,
            tier,
        });
    }

    Ok(PriceQuote {
        lines: priced,
        fees: schedule.breakdown(subtotal),
    })
}
