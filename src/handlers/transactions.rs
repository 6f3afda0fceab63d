use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{LineItemInput, TransactionStatus};
use crate::error::AppError;
use crate::handlers::{json_body, path_param, query_params, Pagination};
use crate::middleware::auth::{Actor, ActorRole};
use crate::services::ledger::{LineItemUpdate, NewTransaction, TransactionUpdate};
use crate::AppState;

pub async fn create_transaction(
    State(state): State<AppState>,
    payload: Result<Json<NewTransaction>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let input = json_body(payload)?;
    let created = state.ledger.create(input).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Depositors see their own deposits, waste banks their own receipts.
pub async fn list_transactions(
    State(state): State<AppState>,
    actor: Actor,
    pagination: Result<Query<Pagination>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = query_params(pagination)?.bounds();

    let transactions = match actor.role {
        ActorRole::Depositor => state.ledger.list_by_depositor(actor.id, limit, offset).await?,
        ActorRole::WasteBank => state.ledger.list_by_waste_bank(actor.id, limit, offset).await?,
        ActorRole::Other(role) => {
            tracing::debug!(actor_id = %actor.id, role = %role, "No transactions visible to role");
            Vec::new()
        }
    };

    Ok(Json(transactions))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    Ok(Json(state.ledger.get(id).await?))
}

pub async fn get_transaction_details(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    Ok(Json(state.ledger.details(id).await?))
}

pub async fn update_transaction(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<TransactionUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    let update = json_body(payload)?;
    Ok(Json(state.ledger.update(id, update).await?))
}

pub async fn confirm_transaction(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    Ok(Json(state.ledger.confirm(id).await?))
}

pub async fn complete_transaction(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    Ok(Json(state.ledger.complete(id).await?))
}

pub async fn cancel_transaction(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    Ok(Json(state.ledger.cancel(id).await?))
}

pub async fn customer_confirm_transaction(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    Ok(Json(state.ledger.customer_confirm(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct BindRequest {
    #[serde(alias = "wasteBankId")]
    pub waste_bank_id: Uuid,
}

/// Retry path for a scan whose bind did not persist.
pub async fn bind_waste_bank(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<BindRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    let request = json_body(payload)?;
    Ok(Json(state.tickets.bind_scanner(id, request.waste_bank_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AddItemsRequest {
    pub items: Vec<LineItemInput>,
}

pub async fn add_line_items(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AddItemsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    let request = json_body(payload)?;
    Ok(Json(state.ledger.add_line_items(id, request.items).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemsRequest {
    pub items: Vec<LineItemUpdate>,
}

pub async fn update_line_items(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateItemsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    let request = json_body(payload)?;
    Ok(Json(
        state
            .ledger
            .attach_or_update_line_items(id, request.items)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: TransactionStatus,
}

/// Generic transition endpoint; unknown status names fail body parsing.
pub async fn transition_transaction(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<TransitionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    let request = json_body(payload)?;
    Ok(Json(state.ledger.transition(id, request.status).await?))
}
