//! HTTP-facing error type.
//!
//! Every failure is converted to a plain-text response at the handler
//! boundary; nothing propagates to the server loop. A probe that ran and
//! exited non-zero is not an error here, it is rendered as a normal report.

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::config::CONTENT_TYPE_TEXT;
use crate::probe::{ExecutionError, Overloaded, ProbeError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Probe capacity exhausted: {0}")]
    Overloaded(#[from] Overloaded),

    #[error("{0}")]
    SpawnFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ProbeError> for AppError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Overloaded(overloaded) => AppError::Overloaded(overloaded),
            ProbeError::Execution(err @ ExecutionError::Spawn { .. }) => {
                AppError::SpawnFailure(err.to_string())
            }
            ProbeError::Execution(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Overloaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SpawnFailure(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Overloaded(overloaded) => {
                tracing::warn!(limit = overloaded.limit, "Rejecting request, probe capacity exhausted");
                "Health check capacity exhausted, retry later".to_string()
            }
            // Spawn diagnostics only name the executable and the OS error
            AppError::SpawnFailure(message) => {
                tracing::error!(error = %message, "Error executing health check");
                format!("Error: {}", message)
            }
            AppError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                "Internal server error".to_string()
            }
        };

        let mut response = (status, body).into_response();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_TEXT));
        response
    }
}
