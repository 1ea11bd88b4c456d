// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use tracing::debug;

use crate::error::AppError;

/// Set by the authenticating gateway in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The signed-in user every store operation is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: String,
    pub email: Option<String>,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let id = header(USER_ID_HEADER)?;
        Some(Self {
            id: id.to_string(),
            email: header(USER_EMAIL_HEADER).map(str::to_string),
        })
    }
}

/// Rejects requests without an identity and exposes the caller as a
/// `CurrentUser` extension to the handlers.
pub async fn require_identity(mut request: Request<Body>, next: Next) -> Result<Response, AppError> {
    let user = CurrentUser::from_headers(request.headers())
        .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, "Missing user identity."))?;

    debug!("Request from user {}", user.id);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_identity_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(CurrentUser::from_headers(&headers), None);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(CurrentUser::from_headers(&headers), None);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("user-42"));
        assert_eq!(CurrentUser::from_headers(&headers), Some(CurrentUser::new("user-42")));

        headers.insert(USER_EMAIL_HEADER, HeaderValue::from_static("me@example.com"));
        assert_eq!(
            CurrentUser::from_headers(&headers),
            Some(CurrentUser::new("user-42").with_email("me@example.com"))
        );
    }
}
