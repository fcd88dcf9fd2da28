use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;

use super::header_value;
use crate::gateway::SIGNATURE_HEADER;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

/// Takes the raw body: the signature covers the exact bytes the gateway sent.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = header_value(&headers, SIGNATURE_HEADER);
    let ack = state.service.handle_webhook(&body, signature).await?;
    Ok(success(ack, "Webhook received"))
}
