use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::models::Purchaser;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod orders;
pub mod tickets;
pub mod webhooks;

pub const BUYER_HEADER: &str = "x-buyer-id";
pub const GUEST_HEADER: &str = "x-guest-session";

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "boxoffice-api",
    };

    success(payload, "Health check successful")
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Exactly one of the buyer or guest-session headers must be present.
pub fn purchaser_from_headers(headers: &HeaderMap) -> Result<Purchaser, AppError> {
    match (
        header_value(headers, BUYER_HEADER),
        header_value(headers, GUEST_HEADER),
    ) {
        (Some(buyer), None) => Uuid::parse_str(buyer).map(Purchaser::Buyer).map_err(|_| {
            AppError::ValidationError(format!("{} must be a UUID", BUYER_HEADER))
        }),
        (None, Some(session)) => Ok(Purchaser::Guest(session.to_string())),
        (Some(_), Some(_)) => Err(AppError::ValidationError(format!(
            "Send either {} or {}, not both",
            BUYER_HEADER, GUEST_HEADER
        ))),
        (None, None) => Err(AppError::ValidationError(format!(
            "Missing purchaser identity: set {} or {}",
            BUYER_HEADER, GUEST_HEADER
        ))),
    }
}

/// Purchaser identity taken from the request headers.
pub struct Identity(pub Purchaser);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        purchaser_from_headers(&parts.headers).map(Identity)
    }
}
