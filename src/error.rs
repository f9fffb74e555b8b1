//! Error taxonomy shared by the store, the services and the HTTP layer.
//!
//! Every failure is resolved at the boundary into a status code and the
//! `{statusCode, message}` envelope. Server-side failures are logged here and
//! their detail never reaches the client.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::response::ApiResponse;

pub type Result<T> = std::result::Result<T, AppError>;

/// Why a token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing authorization token")]
    MissingToken,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("malformed token")]
    Malformed,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account no longer exists")]
    UnknownAccount,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("cancellation allowed only for showtimes more than 24 hours away")]
    CancellationTooSoon,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// PostgreSQL error codes we react to
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

impl AppError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::CancellationTooSoon => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Serialization failures and deadlocks: the transaction was rolled back
    /// by the server and may simply be run again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.db_code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        )
    }

    pub fn is_unique_violation(&self) -> bool {
        self.db_code().as_deref() == Some(UNIQUE_VIOLATION)
    }

    fn db_code(&self) -> Option<String> {
        match self {
            AppError::Database(sqlx::Error::Database(db)) => db.code().map(|c| c.into_owned()),
            _ => None,
        }
    }

    /// Message safe to show to the caller.
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) | AppError::Database(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "request rejected");
        }

        ApiResponse::<()>::message(status, self.public_message()).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match (&e.message, field.as_ref()) {
                    // struct-level checks carry no field name
                    (Some(msg), "__all__") => msg.to_string(),
                    (Some(msg), _) => format!("{field}: {msg}"),
                    (None, _) => format!("{field}: invalid value ({})", e.code),
                })
            })
            .collect();
        messages.sort();
        AppError::Validation(messages.join("; "))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid request payload: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(format!("Invalid path parameter: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(AuthError::Expired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("Seat-1").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::CancellationTooSoon.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = AppError::Internal("connection refused on 10.0.0.3".into());
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::not_found("Reservation");
        assert_eq!(err.public_message(), "Reservation not found");
    }

    #[test]
    fn business_errors_are_never_transient() {
        assert!(!AppError::Conflict("Seat-1 is already reserved".into()).is_transient());
        assert!(!AppError::CancellationTooSoon.is_transient());
        assert!(!AppError::Database(sqlx::Error::RowNotFound).is_transient());
    }
}
