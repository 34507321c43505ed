use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hyperion_core::ChainCommunicationError;

use crate::StorageError;

/// Envelope of every admin API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Whether the request was served
    pub success: bool,
    /// Payload on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A successful admin response.
#[derive(Debug, Clone)]
pub struct ApiSuccess(Value);

impl ApiSuccess {
    /// Serialize `data` into the envelope.
    pub fn new<T: Serialize>(data: T) -> Result<Self, ApiError> {
        serde_json::to_value(data)
            .map(Self)
            .map_err(|err| ApiError::internal(err.to_string()))
    }
}

impl IntoResponse for ApiSuccess {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            success: true,
            data: Some(self.0),
            error: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// A failed admin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Message put in the envelope
    pub message: String,
}

impl ApiError {
    /// The request itself is wrong.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// The request was fine but serving it failed.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<eyre::Report> for ApiError {
    fn from(err: eyre::Report) -> Self {
        Self::internal(format!("{err:#}"))
    }
}

impl From<ChainCommunicationError> for ApiError {
    fn from(err: ChainCommunicationError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Invalid(message) => Self::bad_request(message),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Result of an admin handler.
pub type ApiResult = Result<ApiSuccess, ApiError>;
