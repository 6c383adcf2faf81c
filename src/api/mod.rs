//! HTTP boundary helpers for axum services.
//!
//! This crate does not ship handlers; it ships the pieces a service needs
//! to put the core behind HTTP: bearer extraction and an error type
//! carrying the status mapping.

mod error;

pub use error::{AppError, ErrorResponse};

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

/// Pulls the bearer token out of the `Authorization` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()
        .and_then(|auth| auth.strip_prefix("Bearer "))
}
