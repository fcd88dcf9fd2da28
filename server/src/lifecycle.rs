//! Order state machine.
//!
//! ```text
//! pending ─┬─> (processing) ─┬─> success ──> refunded
//!          │                 ├─> failed
//!          └─────────────────┼─> fraud
//!                            └─> expired
//! ```
//!
//! Every transition is applied by the store as a single guarded update
//! ("set status to X where status is one of the allowed prior states"). Zero
//! rows matched means somebody else already moved the order, which callers
//! treat as a successful no-op.

use serde::Serialize;

use crate::models::OrderStatus;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Applied,
    AlreadyProcessed,
}

impl Transition {
    pub fn from_rows_affected(rows: u64) -> Self {
        if rows == 0 {
            Transition::AlreadyProcessed
        } else {
            Transition::Applied
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// States an order must currently be in for a move to `to` to apply.
pub fn prior_states(to: OrderStatus) -> &'static [OrderStatus] {
    match to {
        OrderStatus::Pending => &[],
        OrderStatus::Processing => &[OrderStatus::Pending],
        OrderStatus::Success | OrderStatus::Failed | OrderStatus::Fraud | OrderStatus::Expired => {
            &[OrderStatus::Pending, OrderStatus::Processing]
        }
        OrderStatus::Refunded => &[OrderStatus::Success],
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    prior_states(to).contains(&from)
}

pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Failed | OrderStatus::Fraud | OrderStatus::Expired | OrderStatus::Refunded
    )
}

/// Closing states hand the reserved stock back to the pool.
pub fn releases_inventory(to: OrderStatus) -> bool {
    matches!(
        to,
        OrderStatus::Failed | OrderStatus::Fraud | OrderStatus::Expired
    )
}

/// Target states accepted by `OrderStore::close_pending`.
pub fn ensure_closing(to: OrderStatus) -> Result<(), AppError> {
    if releases_inventory(to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition {
            from: OrderStatus::Pending,
            to,
        })
    }
}

/// Pre-check for administrative moves: "already there" is a no-op, anything
/// the machine forbids is an error.
pub fn check_reachable(current: OrderStatus, to: OrderStatus) -> Result<Transition, AppError> {
    if current == to {
        Ok(Transition::AlreadyProcessed)
    } else if can_transition(current, to) {
        Ok(Transition::Applied)
    } else {
        Err(AppError::InvalidTransition { from: current, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Success,
        OrderStatus::Failed,
        OrderStatus::Fraud,
        OrderStatus::Expired,
        OrderStatus::Refunded,
    ];

    #[test]
    fn test_nothing_returns_to_pending() {
        for from in ALL {
            assert!(!can_transition(from, OrderStatus::Pending));
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.into_iter().filter(|s| is_terminal(*s)) {
            for to in ALL {
                assert!(!can_transition(from, to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_success_only_moves_to_refunded() {
        for to in ALL {
            assert_eq!(
                can_transition(OrderStatus::Success, to),
                to == OrderStatus::Refunded
            );
        }
    }

    #[test]
    fn test_release_only_on_closing_states() {
        assert!(releases_inventory(OrderStatus::Expired));
        assert!(releases_inventory(OrderStatus::Failed));
        assert!(releases_inventory(OrderStatus::Fraud));
        assert!(!releases_inventory(OrderStatus::Success));
        assert!(!releases_inventory(OrderStatus::Refunded));
        assert!(ensure_closing(OrderStatus::Success).is_err());
    }

    #[test]
    fn test_rows_affected_maps_to_transition() {
        assert_eq!(Transition::from_rows_affected(0), Transition::AlreadyProcessed);
        assert_eq!(Transition::from_rows_affected(1), Transition::Applied);
    }

    #[test]
    fn test_check_reachable() {
        assert_eq!(
            check_reachable(OrderStatus::Pending, OrderStatus::Success).unwrap(),
            Transition::Applied
        );
        assert_eq!(
            check_reachable(OrderStatus::Refunded, OrderStatus::Refunded).unwrap(),
            Transition::AlreadyProcessed
        );
        assert!(check_reachable(OrderStatus::Pending, OrderStatus::Refunded).is_err());
        assert!(check_reachable(OrderStatus::Success, OrderStatus::Fraud).is_err());
    }
}
