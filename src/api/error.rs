//! Mapping from domain errors to HTTP responses.
//!
//! Bodies are short fixed reasons; internal detail only goes to the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::auth::AuthError;
use crate::orchestrator::SessionError;

/// Error surfaced to HTTP callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    /// 401: bad or missing assertion/token
    Unauthorized,
    /// 400: malformed identifier
    BadRequest(&'static str),
    /// 404: no record for an authenticated subject
    NotFound,
    /// 500: storage or signing failed
    Internal(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::BadRequest(reason) | Self::Internal(reason) => *reason,
            Self::NotFound => "not found",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.reason()).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidSubject(_) => Self::BadRequest("bad user id"),
            SessionError::UserNotFound(_) => Self::NotFound,
            SessionError::Storage(_) => Self::Internal("db error"),
            SessionError::Token(_) => Self::Internal("token error"),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(_: AuthError) -> Self {
        Self::Unauthorized
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
