//! Pieces of the HTTP contract shared by the manager and worker APIs.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Error body returned by both APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrResponse {
    pub status: u16,
    pub message: String,
}

impl ErrResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ErrResponse {
            status: status.as_u16(),
            message: message.into(),
        }
    }

    pub fn not_found(id: Uuid) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("task {} not found", id))
    }
}

impl IntoResponse for ErrResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Any body that fails to decode is a 400, whatever axum would pick.
pub fn decode_error(rejection: JsonRejection) -> ErrResponse {
    let message = format!("error decoding request body: {}", rejection.body_text());
    warn!(%message, "rejected request body");
    ErrResponse::new(StatusCode::BAD_REQUEST, message)
}

pub fn parse_task_id(raw: &str) -> Result<Uuid, ErrResponse> {
    Uuid::parse_str(raw).map_err(|e| {
        ErrResponse::new(
            StatusCode::BAD_REQUEST,
            format!("invalid task id {:?}: {}", raw, e),
        )
    })
}
