//! Mapping from domain errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::identity::IdentityError;
use crate::outfit::SelectError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("too many requests")]
    RateLimited,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Selection(#[from] SelectError),
    #[error("stored image {key} could not be decoded")]
    UnreadableImage {
        key: String,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Identity(IdentityError::Rejected { .. }) => StatusCode::BAD_REQUEST,
            Self::Identity(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(e) => match e {
                StorageError::AlreadyExists(_) => StatusCode::CONFLICT,
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                StorageError::InvalidSignature => StatusCode::FORBIDDEN,
                StorageError::Io { .. } | StorageError::BaseUrl(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Selection(e) => match e {
                SelectError::NoCandidates => StatusCode::NOT_FOUND,
                SelectError::InvalidScore { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                SelectError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::UnreadableImage { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Join-error adapter for `spawn_blocking` results.
    pub fn from_join(err: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::anyhow!("blocking task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            // full chain goes to the log, not the client
            tracing::error!(error = ?anyhow::Error::new(self), status = status.as_u16(), "request failed");
            "internal server error".to_string()
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
            self.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
