use crate::models::AssetKind;
use crate::Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Asset(#[from] Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("File too large for {kind}: the limit is {limit} bytes")]
    BodyTooLarge { kind: AssetKind, limit: u64 },

    #[error("Unknown asset kind '{0}'")]
    UnknownKind(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Asset(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Asset(Error::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Asset(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) | ApiError::BodyTooLarge { .. } => StatusCode::BAD_REQUEST,
            ApiError::UnknownKind(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        let mut body = json!({
            "success": false,
            "error": self.to_string(),
        });
        if let ApiError::Asset(Error::Validation(errors)) = &self {
            body["details"] = json!(errors);
        }

        (status, Json(body)).into_response()
    }
}
