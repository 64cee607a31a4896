//! HTTP error mapping for the gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use intent_common::Error;
use serde::{Deserialize, Serialize};

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// An `intent_common::Error` on its way out of a handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    inner: Error,
}

impl ApiError {
    /// Map with the standard status for the error kind.
    pub fn new(inner: Error) -> Self {
        let status =
            StatusCode::from_u16(inner.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, inner }
    }

    /// Mapping used by the chat endpoints: invalid input is 400, everything
    /// else is 500. A provider rate limit stays visible through `code`.
    pub fn for_chat(inner: Error) -> Self {
        let status = match &inner {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, inner }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::new(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %self.inner, "Request failed");
        }

        let body = ErrorResponse {
            error: self.inner.to_string(),
            code: self.inner.code().to_string(),
        };

        (self.status, Json(body)).into_response()
    }
}
