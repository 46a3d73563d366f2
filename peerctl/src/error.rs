//! Error taxonomy for the peerctl service
//!
//! Read-path reference failures are absorbed by the fallback layer in
//! `refs`; everything surfacing here is either a write-path failure or a
//! condition the caller must be able to distinguish (quota, validation,
//! task dedup, polling timeout).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::refs::RefError;

/// Result type for peerctl operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Record or reference absent on a write/identity-confirming path
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input, bad ip version argument, template/schema mismatch
    #[error("Validation error: {0}")]
    Validation(String),

    /// Session quota exceeded, checked before starting a new transition
    #[error("Usage limit exceeded: {0}")]
    UsageLimit(String),

    /// No policy resolvable for an entity, directly or through inheritance
    #[error(
        "No policy could be obtained for {0}, either directly or through \
         the policy hierarchy. You can set a global policy that will be \
         applied in such cases."
    )]
    PolicyMissing(String),

    /// Message rendering failed
    #[error("Could not render template: {0}")]
    TemplateRender(String),

    /// A task for the same ASN pair is already in flight
    #[error("Task already pending: {0}")]
    TaskLimit(String),

    /// Outbound payload failed schema validation, request was not sent
    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    /// Status polling budget exhausted
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Remote service bridge call failed
    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Common(#[from] peerctl_common::Error),
}

impl From<RefError> for Error {
    fn from(err: RefError) -> Self {
        match err {
            RefError::NotFound(msg) => Error::NotFound(msg),
            RefError::NotSet(msg) => Error::NotFound(msg),
            RefError::SourceInvalid(msg) => Error::Validation(msg),
            RefError::Bridge(msg) => Error::Bridge(msg),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Validation(_) | Error::SchemaValidation(_) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            Error::UsageLimit(_) => (StatusCode::TOO_MANY_REQUESTS, "USAGE_LIMIT"),
            Error::PolicyMissing(_) => (StatusCode::CONFLICT, "POLICY_MISSING"),
            Error::TemplateRender(_) => (StatusCode::BAD_REQUEST, "TEMPLATE_ERROR"),
            Error::TaskLimit(_) => (StatusCode::CONFLICT, "TASK_PENDING"),
            Error::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            Error::Bridge(_) => (StatusCode::BAD_GATEWAY, "BRIDGE_ERROR"),
            Error::Database(_) | Error::Common(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
