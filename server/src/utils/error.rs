use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::OrderStatus;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock for tier '{tier}': requested {requested}, available {available}")]
    InsufficientStock {
        tier: String,
        requested: i32,
        available: i32,
    },

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Amount mismatch: expected {expected}, gateway reported {paid}")]
    AmountMismatch { expected: i64, paid: i64 },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientStock { .. } => StatusCode::CONFLICT,
            AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::AmountMismatch { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthorized(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::InsufficientStock { .. }
            | AppError::InvalidTransition { .. }
            | AppError::InvalidSignature
            | AppError::AmountMismatch { .. } => {
                warn!(code = self.code(), error = %self, "Request rejected");
            }
            AppError::ExternalServiceError(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthorized(msg) => msg.clone(),
            AppError::InsufficientStock { tier, .. } => {
                format!("Not enough tickets left for '{}'", tier)
            }
            AppError::InvalidSignature => "Signature verification failed".to_string(),
            AppError::AmountMismatch { .. } => {
                "Payment amount does not match the order total, please contact support".to_string()
            }
            AppError::InvalidTransition { .. } => self.to_string(),
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::ExternalServiceError(_) => "Payment provider is unavailable".to_string(),
            AppError::InternalServerError(_) => "Internal server error".to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::InsufficientStock {
                tier,
                requested,
                available,
            } => Some(json!({
                "tier": tier,
                "requested": requested,
                "available": available,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        error_response(code, self.public_message(), self.details(), status)
    }
}
