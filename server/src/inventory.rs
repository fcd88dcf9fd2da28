//! Reservation coordinator.
//!
//! Stock moves only through `reserve` and `release`, each a single
//! predicate-guarded `UPDATE`. Row-level locking in Postgres serialises
//! concurrent buyers on the same tier; a predicate that matches no row is the
//! terminal answer, so nothing here retries.
//!
//! Both functions take a connection rather than the pool so they always run
//! inside the caller's transaction alongside the order write.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::TicketTier;
use crate::utils::error::AppError;

fn ensure_positive(quantity: i32) -> Result<(), AppError> {
    if quantity <= 0 {
        return Err(AppError::ValidationError(format!(
            "Quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}

fn over_release(tier_id: Uuid, quantity: i32, sold: i32) -> AppError {
    AppError::InternalServerError(format!(
        "Refusing to release {} units of tier {}: only {} sold",
        quantity, tier_id, sold
    ))
}

pub async fn reserve(conn: &mut PgConnection, tier_id: Uuid, quantity: i32) -> Result<(), AppError> {
    ensure_positive(quantity)?;

    let result = sqlx::query(
        r#"
        UPDATE ticket_tiers
        SET sold = sold + $2,
            available = available - $2,
            updated_at = NOW()
        WHERE id = $1 AND available >= $2
        "#,
    )
    .bind(tier_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        tracing::debug!(%tier_id, quantity, "Reserved stock");
        return Ok(());
    }

    let current: Option<(String, i32)> =
        sqlx::query_as("SELECT name, available FROM ticket_tiers WHERE id = $1")
            .bind(tier_id)
            .fetch_optional(&mut *conn)
            .await?;

    match current {
        Some((tier, available)) => Err(AppError::InsufficientStock {
            tier,
            requested: quantity,
            available,
        }),
        None => Err(AppError::NotFound(format!("Ticket tier {} not found", tier_id))),
    }
}

pub async fn release(conn: &mut PgConnection, tier_id: Uuid, quantity: i32) -> Result<(), AppError> {
    ensure_positive(quantity)?;

    let result = sqlx::query(
        r#"
        UPDATE ticket_tiers
        SET sold = sold - $2,
            available = available + $2,
            updated_at = NOW()
        WHERE id = $1 AND sold >= $2
        "#,
    )
    .bind(tier_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        tracing::debug!(%tier_id, quantity, "Released stock");
        return Ok(());
    }

    let sold: Option<i32> = sqlx::query_scalar("SELECT sold FROM ticket_tiers WHERE id = $1")
        .bind(tier_id)
        .fetch_optional(&mut *conn)
        .await?;

    match sold {
        Some(sold) => Err(over_release(tier_id, quantity, sold)),
        None => Err(AppError::NotFound(format!("Ticket tier {} not found", tier_id))),
    }
}

/// In-memory counterpart of [`reserve`] with the same predicate.
pub fn reserve_in_place(tier: &mut TicketTier, quantity: i32) -> Result<(), AppError> {
    ensure_positive(quantity)?;
    if tier.available < quantity {
        return Err(AppError::InsufficientStock {
            tier: tier.name.clone(),
            requested: quantity,
            available: tier.available,
        });
    }
    tier.sold += quantity;
    tier.available -= quantity;
    Ok(())
}

/// In-memory counterpart of [`release`] with the same predicate.
pub fn release_in_place(tier: &mut TicketTier, quantity: i32) -> Result<(), AppError> {
    ensure_positive(quantity)?;
    if tier.sold < quantity {
        return Err(over_release(tier.id, quantity, tier.sold));
    }
    tier.sold -= quantity;
    tier.available += quantity;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tier(capacity: i32) -> TicketTier {
        TicketTier {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "General".to_string(),
            unit_price: 250_000,
            capacity,
            sold: 0,
            available: capacity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_reserve_then_release_restores_counts() {
        let mut t = tier(100);
        reserve_in_place(&mut t, 25).unwrap();
        assert_eq!((t.sold, t.available), (25, 75));
        release_in_place(&mut t, 25).unwrap();
        assert_eq!((t.sold, t.available), (0, 100));
        assert!(t.is_consistent());
    }

    #[test]
    fn test_over_release_fails_without_effect() {
        let mut t = tier(100);
        reserve_in_place(&mut t, 25).unwrap();
        assert!(release_in_place(&mut t, 45).is_err());
        assert_eq!((t.sold, t.available), (25, 75));
    }

    #[test]
    fn test_reserve_beyond_available_fails_without_effect() {
        let mut t = tier(10);
        reserve_in_place(&mut t, 8).unwrap();
        let err = reserve_in_place(&mut t, 3).unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { available: 2, .. }));
        assert_eq!((t.sold, t.available), (8, 2));
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let mut t = tier(10);
        assert!(matches!(
            reserve_in_place(&mut t, 0),
            Err(AppError::ValidationError(_))
        ));
        assert!(release_in_place(&mut t, -1).is_err());
    }
}
