//! Bearer token check for the ingestion endpoints.
//!
//! When `PULSE_INGEST_TOKEN` is set, requests must carry
//! `Authorization: Bearer <token>` with exactly that token. Without a
//! configured token every request is accepted as anonymous.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Caller allowed to submit analytics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestClient {
    /// No token is configured
    Anonymous,
    /// Presented the configured token
    Authenticated,
}

impl FromRequestParts<AppState> for IngestClient {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.ingest_token.as_deref() else {
            return Ok(IngestClient::Anonymous);
        };

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match auth_header.and_then(|header| header.strip_prefix("Bearer ")) {
            Some(token) if token == expected => Ok(IngestClient::Authenticated),
            Some(_) => {
                tracing::warn!("Rejected request with invalid ingest token");
                Err(AppError::Unauthorized("Invalid bearer token"))
            }
            None if auth_header.is_some() => Err(AppError::Unauthorized(
                "Invalid authorization header format",
            )),
            None => Err(AppError::Unauthorized("Missing authorization header")),
        }
    }
}
