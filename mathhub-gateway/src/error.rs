//! Error types for the gateway crate.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use mathhub_core::{CoreError, PrivilegeLevel};
use mathhub_sandbox::{EvaluationError, ResolveError, SandboxError};

/// Errors that can occur during gateway request handling.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The requested quest does not exist or is not published.
    #[error("quest not found: {0}")]
    NotFound(String),

    /// The request body is malformed or contains invalid values.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The caller carried no usable identity.
    #[error("caller identity missing or malformed")]
    Unauthorized,

    /// The caller's privilege is below what the route requires.
    #[error("privilege {actual} is below the required {required}")]
    Forbidden { required: PrivilegeLevel, actual: PrivilegeLevel },

    /// The request's sandbox could not be created.
    #[error(transparent)]
    Sandbox(SandboxError),

    /// A stored question variable or answer failed to resolve.
    #[error(transparent)]
    Resolve(ResolveError),

    /// Validation or storage rules were violated.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<EvaluationError> for GatewayError {
    fn from(err: EvaluationError) -> Self {
        match err {
            EvaluationError::Resolve(e) => Self::Resolve(e),
            EvaluationError::Sandbox(e) => Self::Sandbox(e),
            other => Self::Sandbox(SandboxError::Protocol(other.to_string())),
        }
    }
}

impl GatewayError {
    /// HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) | Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Sandbox(e) | Self::Resolve(ResolveError { source: e, .. }) => sandbox_status(e),
        }
    }

    /// The sandbox error behind this failure, if any.
    fn sandbox_error(&self) -> Option<&SandboxError> {
        match self {
            Self::Sandbox(e) | Self::Resolve(ResolveError { source: e, .. }) => Some(e),
            _ => None,
        }
    }

    /// Message shown to clients. Validation failures keep the wording the
    /// web client already matches on.
    fn public_message(&self) -> String {
        match self {
            Self::Core(CoreError::InvalidQueryRange { .. }) => "Invalid query range.".to_owned(),
            Self::Core(CoreError::UndefinedKind { .. }) => "Data error.".to_owned(),
            Self::Core(CoreError::DuplicateCode(_)) => "Duplicated question number.".to_owned(),
            Self::InvalidRequest(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

fn sandbox_status(err: &SandboxError) -> StatusCode {
    match err {
        SandboxError::UserCode { .. }
        | SandboxError::ExecutionTimeout { .. }
        | SandboxError::UnsupportedValueType { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SandboxError::ResourceExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "request rejected");
        }
        let body = match self.sandbox_error() {
            Some(e) => json!({"error": self.public_message(), "kind": e.kind()}),
            None => json!({"error": self.public_message()}),
        };
        (status, Json(body)).into_response()
    }
}
