use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::{path_param, query_params, Pagination};
use crate::AppState;

pub async fn get_wallet(
    State(state): State<AppState>,
    depositor_id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let depositor_id = path_param(depositor_id)?;
    Ok(Json(state.wallets.get_or_create(depositor_id).await?))
}

pub async fn list_wallet_entries(
    State(state): State<AppState>,
    depositor_id: Result<Path<Uuid>, PathRejection>,
    pagination: Result<Query<Pagination>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let depositor_id = path_param(depositor_id)?;
    let (limit, offset) = query_params(pagination)?.bounds();
    let entries = state
        .wallets
        .list_entries(depositor_id, limit, offset)
        .await?;

    Ok(Json(entries))
}
