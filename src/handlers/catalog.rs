use axum::{
    extract::{rejection::PathRejection, Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::path_param;
use crate::AppState;

pub async fn list_waste_categories(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog.list().await?))
}

pub async fn get_waste_category(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_param(id)?;
    Ok(Json(state.catalog.get(id).await?))
}
