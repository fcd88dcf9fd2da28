use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;

use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{error, success};

pub async fn verify_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let claims = state.service.verify_ticket(&code)?;
    Ok(success(claims, "Ticket signature is valid"))
}

/// A repeat scan answers 409 so the gate cannot mistake it for an admission.
pub async fn check_in(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let check_in = state.service.check_in(&code).await?;
    if !check_in.transition.is_applied() {
        return Ok(error(
            "ALREADY_CHECKED_IN",
            "Ticket was already used",
            serde_json::to_value(&check_in).ok(),
            StatusCode::CONFLICT,
        ));
    }
    Ok(success(check_in, "Ticket checked in"))
}
