//! Matrix-style HTTP errors.
//!
//! Every failure on the HTTP surface is answered with
//! `{"errcode": ..., "error": ...}` and a fixed status code, the shape the
//! homeserver and sync proxy already understand.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::registry::DeliveryError;

/// Token extraction or lookup failure.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingToken,

    #[error("Unknown authorization token")]
    UnknownToken,
}

impl AuthError {
    pub fn errcode(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "M_MISSING_TOKEN",
            AuthError::UnknownToken => "M_UNKNOWN_TOKEN",
        }
    }
}

/// Why an inbound push was not delivered.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Failed to decode request JSON")]
    BadPayload(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Request timed out")]
    Timeout,

    #[error("Unhandled middleware error: {0}")]
    Unhandled(String),
}

impl IngressError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngressError::Auth(_) => StatusCode::FORBIDDEN,
            IngressError::BadPayload(_) => StatusCode::BAD_REQUEST,
            IngressError::Delivery(_) => StatusCode::BAD_GATEWAY,
            IngressError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            IngressError::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn errcode(&self) -> &'static str {
        match self {
            IngressError::Auth(e) => e.errcode(),
            IngressError::BadPayload(_) => "M_BAD_JSON",
            IngressError::Delivery(DeliveryError::SendFailed(_)) => "FI.MAU.WS_SEND_FAIL",
            IngressError::Delivery(DeliveryError::NotConnected) => "FI.MAU.WS_NOT_CONNECTED",
            IngressError::Timeout | IngressError::Unhandled(_) => "M_UNKNOWN",
        }
    }

    /// Client-facing message. Internal details stay in the logs.
    pub fn message(&self) -> &'static str {
        match self {
            IngressError::Auth(AuthError::MissingToken) => "Missing authorization header",
            IngressError::Auth(AuthError::UnknownToken) => "Unknown authorization token",
            IngressError::BadPayload(_) => "Failed to decode request JSON",
            IngressError::Delivery(DeliveryError::SendFailed(_)) => {
                "Failed to send data through websocket"
            }
            IngressError::Delivery(DeliveryError::NotConnected) => {
                "Endpoint is not connected to websocket"
            }
            IngressError::Timeout => "Request timed out",
            IngressError::Unhandled(_) => "Internal server error",
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            IngressError::Auth(_) => "unauthorized",
            IngressError::BadPayload(_) => "bad_payload",
            IngressError::Delivery(DeliveryError::NotConnected) => "not_connected",
            IngressError::Delivery(DeliveryError::SendFailed(_)) => "send_failed",
            IngressError::Timeout => "timeout",
            IngressError::Unhandled(_) => "internal",
        }
    }
}

#[derive(Debug, Serialize)]
struct MatrixError {
    errcode: &'static str,
    error: &'static str,
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        let body = MatrixError {
            errcode: self.errcode(),
            error: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        IngressError::Auth(self).into_response()
    }
}
