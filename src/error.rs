// ABOUTME: HTTP boundary error mapping — ToolforgeError to status code and JSON envelope
// ABOUTME: Every editor API route and generated-server dispatcher handler returns AppResult<T>
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! Maps [`toolforge_core::ToolforgeError`] onto HTTP status codes at the
//! editor control plane and generated-server boundary (spec §7). The core
//! crate stays free of any HTTP dependency; this mapping lives here instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use toolforge_core::{ErrorKind, ToolforgeError};

/// Wraps [`ToolforgeError`] so it can be returned directly from an Axum
/// handler.
#[derive(Debug)]
pub struct AppError(pub ToolforgeError);

/// Convenience alias for fallible Axum handlers across the editor API and
/// generated dispatcher routes.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl ErrorKindStatus for ErrorKind {
    fn status_code(self) -> StatusCode {
        match self {
            Self::ToolNotFound | Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidArgument | Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::HandlerError | Self::SpawnFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConcurrencyConflict | Self::NotBuilt => StatusCode::CONFLICT,
            Self::Protected => StatusCode::FORBIDDEN,
            // ServiceBindingError never reaches an HTTP boundary: the
            // generator aborts the Generate call before any artifact or
            // response is produced (spec §7 propagation rule).
            Self::ServiceBindingError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

trait ErrorKindStatus {
    fn status_code(self) -> StatusCode;
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.0.kind.status_code();
        let body = ErrorBody {
            kind: self.0.kind.as_str(),
            message: self.0.message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ToolforgeError> for AppError {
    fn from(err: ToolforgeError) -> Self {
        Self(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self(ToolforgeError::from(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self(ToolforgeError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_conflict_maps_to_409() {
        let err = AppError(ToolforgeError::conflict("stale mtime"));
        assert_eq!(err.0.kind.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn protected_maps_to_403() {
        let err = AppError(ToolforgeError::protected("cannot delete default"));
        assert_eq!(err.0.kind.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn tool_not_found_maps_to_404() {
        let err = AppError(ToolforgeError::tool_not_found("mail_fetch_filter"));
        assert_eq!(err.0.kind.status_code(), StatusCode::NOT_FOUND);
    }
}
