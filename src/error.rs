//! Typed errors for the small HTTP-facing surface (websocket upgrade, healthz).
//!
//! Everything inside a session actor stays in-process `Result`/match control flow
//! and never produces an HTTP response — there's no HTTP response to produce
//! once a socket has been upgraded. This module only covers the boundary before that.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

pub const HEADER_ERROR_CODE: &str = "X-Bridge-Error-Code";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("missing required configuration: {0}")]
    Config(String),

    #[error("websocket upgrade failed: {0}")]
    Upgrade(String),
}

impl BridgeError {
    fn code(&self) -> &'static str {
        match self {
            BridgeError::Config(_) => "config_error",
            BridgeError::Upgrade(_) => "upgrade_failed",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            BridgeError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BridgeError::Upgrade(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let body = ErrorResponse {
            error: ErrorDetail { code, message: self.to_string() },
        };
        let mut response = (status, axum::Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(code) {
            response.headers_mut().insert(HEADER_ERROR_CODE, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_maps_to_500() {
        let err = BridgeError::Config("OPENAI_API_KEY not set".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "config_error");
    }

    #[test]
    fn upgrade_error_maps_to_400() {
        let err = BridgeError::Upgrade("call_sid path segment must not be empty".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "upgrade_failed");
    }
}
