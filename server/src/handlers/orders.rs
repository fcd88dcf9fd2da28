use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::Identity;
use crate::lifecycle::Transition;
use crate::models::Contact;
use crate::pricing::CartLine;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub contact: Contact,
    pub items: Vec<CartLine>,
}

#[derive(Serialize)]
struct TransitionPayload<'a> {
    reference: &'a str,
    transition: Transition,
}

pub async fn create_order(
    State(state): State<AppState>,
    Identity(purchaser): Identity,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let order = state
        .service
        .initialize_order(purchaser, request.contact, request.items)
        .await?;
    Ok(created(order, "Order created, complete payment to receive tickets"))
}

pub async fn get_order(
    State(state): State<AppState>,
    Identity(purchaser): Identity,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let details = state.service.get_order(&reference, &purchaser).await?;
    Ok(success(details, "Order retrieved"))
}

pub async fn order_tickets(
    State(state): State<AppState>,
    Identity(purchaser): Identity,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let tickets = state.service.tickets(&reference, &purchaser).await?;
    Ok(success(tickets, "Tickets retrieved"))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let details = state.service.verify_payment(&reference).await?;
    let message = format!("Order is {}", details.order.status);
    Ok(success(details, message))
}

pub async fn refund_order(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let transition = state.service.refund_order(&reference).await?;
    Ok(success(
        TransitionPayload {
            reference: &reference,
            transition,
        },
        "Refund recorded",
    ))
}

pub async fn mark_fraud(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let transition = state.service.mark_fraud(&reference).await?;
    Ok(success(
        TransitionPayload {
            reference: &reference,
            transition,
        },
        "Order marked as fraud",
    ))
}
