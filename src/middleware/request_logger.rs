use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use uuid::Uuid;

use crate::error::AppError;

const MAX_BODY_LOG_SIZE: usize = 1024; // 1KB limit for body logging

tokio::task_local! {
    static REQUEST_PATH: String;
}

/// Path of the request being served on this task, if any.
pub fn current_request_path() -> Option<String> {
    REQUEST_PATH.try_with(|path| path.clone()).ok()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogSettings {
    pub log_body: bool,
}

pub async fn request_logger_middleware(
    State(settings): State<RequestLogSettings>,
    mut req: Request<Body>,
    next: Next<Body>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let header_value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &header_value {
        req.headers_mut().insert("x-request-id", value.clone());
    }

    if settings.log_body {
        let (parts, body) = req.into_parts();
        let bytes = match Bytes::from_request(Request::new(body), &()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    uri = %uri,
                    error = %e,
                    "Failed to read request body"
                );
                let mut response =
                    AppError::BadRequest("request body could not be read".to_string())
                        .into_response();
                if let Some(value) = header_value {
                    response.headers_mut().insert("x-request-id", value);
                }
                return response;
            }
        };

        tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            body_size = bytes.len(),
            body = %describe_body(&bytes),
            "Incoming request"
        );

        req = Request::from_parts(parts, Body::from(bytes));
    } else {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            "Incoming request"
        );
    }

    let response = REQUEST_PATH
        .scope(uri.path().to_string(), next.run(req))
        .await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = latency.as_millis(),
        "Outgoing response"
    );

    let (mut parts, body) = response.into_parts();
    if let Some(value) = header_value {
        parts.headers.insert("x-request-id", value);
    }

    Response::from_parts(parts, body)
}

fn describe_body(bytes: &Bytes) -> String {
    if bytes.is_empty() {
        return "[empty]".to_string();
    }
    if bytes.len() > MAX_BODY_LOG_SIZE {
        return format!("[{} bytes, not logged]", bytes.len());
    }

    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(json) => {
            let sanitized = crate::utils::sanitize::sanitize_json(&json);
            serde_json::to_string(&sanitized).unwrap_or_else(|_| "[invalid json]".to_string())
        }
        Err(_) => format!("[non-json, {} bytes]", bytes.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Router};
    use tower::ServiceExt;

    fn app(log_body: bool) -> Router {
        Router::new()
            .route("/echo", post(|body: String| async move { body }))
            .route(
                "/path",
                post(|| async { current_request_path().unwrap_or_default() }),
            )
            .layer(axum::middleware::from_fn_with_state(
                RequestLogSettings { log_body },
                request_logger_middleware,
            ))
    }

    async fn body_string(response: Response) -> String {
        let bytes = Bytes::from_request(Request::new(response.into_body()), &())
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_request_logger_adds_request_id() {
        let response = app(false)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn body_survives_logging() {
        let payload = r#"{"qr_token":"GCB-abcdef-1-123456789012","waste_bank_id":"x"}"#;
        let response = app(true)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_string(response).await, payload);
    }

    #[tokio::test]
    async fn scopes_request_path_for_handlers() {
        let response = app(false)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/path?limit=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_string(response).await, "/path");
    }

    #[tokio::test]
    async fn unreadable_body_is_rejected() {
        let (sender, body) = Body::channel();
        sender.abort();

        let response = app(true)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(response.headers().contains_key("x-request-id"));
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error_code"], "BAD_REQUEST");
    }

    #[test]
    fn path_is_absent_outside_a_request() {
        assert_eq!(current_request_path(), None);
    }

    #[test]
    fn large_bodies_are_summarised() {
        let bytes = Bytes::from(vec![b'a'; MAX_BODY_LOG_SIZE + 1]);
        assert!(describe_body(&bytes).contains("not logged"));
        assert_eq!(describe_body(&Bytes::from_static(b"plain")), "[non-json, 5 bytes]");
    }
}
