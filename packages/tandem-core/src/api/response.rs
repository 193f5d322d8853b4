//! HTTP response helper functions for consistent API responses.
//!
//! Error bodies are produced by [`TandemError`](crate::error::TandemError)'s
//! `IntoResponse` implementation.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

/// Standard API success response with JSON data.
pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// Simple success response with `{ "success": true }`.
pub fn api_ok() -> impl IntoResponse {
    api_success(json!({ "success": true }))
}
