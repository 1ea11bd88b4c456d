// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::ValidationError;
use thiserror::Error;
use uuid::Uuid;

/// Failures of the task store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected before reaching the database.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The id does not exist or belongs to another user.
    #[error("Task with ID {0} not found.")]
    NotFound(Uuid),

    /// Database or transport failure.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Our custom error type for the HTTP layer.
#[derive(Debug)]
pub struct AppError {
    pub(crate) code: StatusCode,
    pub(crate) message: String,
}

impl AppError {
    pub fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => Self::new(StatusCode::BAD_REQUEST, &e.to_string()),
            err @ StoreError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, &err.to_string()),
            StoreError::Backend(e) => e.into(),
        }
    }
}

/// Internal errors are logged in full and hidden from the client.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Internal server error: {:?}", err);
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred.".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(
            "Responding with error: status_code={}, message={}",
            self.code.as_u16(),
            self.message
        );
        (
            self.code,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_status_mapping() {
        let err: AppError = StoreError::Validation(ValidationError::EmptyTitle).into();
        assert_eq!(err.code, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Title is required.");

        let id = Uuid::new_v4();
        let err: AppError = StoreError::NotFound(id).into();
        assert_eq!(err.code, StatusCode::NOT_FOUND);
        assert_eq!(err.message, format!("Task with ID {id} not found."));

        let err: AppError = StoreError::Backend(anyhow::anyhow!("disk on fire")).into();
        assert_eq!(err.code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "An internal error occurred.");
    }
}
