use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::json_body;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(alias = "depositorId")]
    pub depositor_id: Uuid,
    #[serde(default, alias = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = json_body(payload)?;
    let ticket = state
        .tickets
        .issue_ticket(request.depositor_id, request.expires_at)
        .await?;

    Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(alias = "qrToken", alias = "qr_token")]
    pub token: String,
    #[serde(alias = "wasteBankId")]
    pub waste_bank_id: Uuid,
}

pub async fn verify(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = json_body(payload)?;
    let resolution = state
        .tickets
        .verify(&request.token, request.waste_bank_id)
        .await?;

    Ok(Json(resolution))
}
