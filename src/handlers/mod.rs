pub mod catalog;
pub mod qr;
pub mod transactions;
pub mod wallets;

use crate::error::AppError;
use crate::validation::page_bounds;
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub db: String,
    pub db_pool: DbPoolStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DbPoolStats {
    pub active_connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
    pub usage_percent: f32,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            "disconnected"
        }
    };

    let pool = &state.db;
    let active_connections = pool.size();
    let max_connections = pool.options().get_max_connections();

    let health_response = HealthStatus {
        status: if db_status == "connected" {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        db: db_status.to_string(),
        db_pool: DbPoolStats {
            active_connections,
            idle_connections: pool.num_idle() as u32,
            max_connections,
            usage_percent: (active_connections as f32 / max_connections as f32) * 100.0,
        },
    };

    // Return 503 if database is down, 200 otherwise
    let status_code = if db_status == "connected" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// `(limit, offset)` with the default and clamping applied.
    pub fn bounds(&self) -> (i64, i64) {
        page_bounds(self.limit, self.offset)
    }
}

/// Unwraps a JSON body, reporting malformed input as a validation error.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// Unwraps a path parameter; a malformed id is a bad request.
pub(crate) fn path_param<T>(param: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    param
        .map(|Path(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Unwraps query parameters; unparseable values are a bad request.
pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, Bytes},
        extract::FromRequest,
        http::Request,
        response::Response,
        routing::get,
        Router,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app() -> Router {
        Router::new()
            .route(
                "/items/:id",
                get(|id: Result<Path<Uuid>, PathRejection>| async move {
                    path_param(id).map(|id| id.to_string())
                }),
            )
            .route(
                "/items",
                get(|page: Result<Query<Pagination>, QueryRejection>| async move {
                    query_params(page).map(|page| format!("{:?}", page.bounds()))
                }),
            )
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = Bytes::from_request(Request::new(response.into_body()), &())
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn get_uri(uri: &str) -> Response {
        app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn malformed_id_gets_structured_error() {
        let response = get_uri("/items/not-a-uuid").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json(response).await;
        assert_eq!(body["error_code"], "BAD_REQUEST");
        assert_eq!(body["status"], 400);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn malformed_query_gets_structured_error() {
        let response = get_uri("/items?limit=ten").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error_code"], "BAD_REQUEST");

        let response = get_uri("/items?limit=5").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(Pagination::default().bounds(), (10, 0));
        assert_eq!(
            Pagination {
                limit: Some(500),
                offset: Some(-3)
            }
            .bounds(),
            (100, 0)
        );
    }
}
