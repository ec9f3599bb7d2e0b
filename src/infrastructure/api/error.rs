use crate::shared::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server rejected the request: {status} {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Unexpected response shape: {0}")]
    Decode(String),

    #[error("Not authorized")]
    Unauthorized,
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => AppError::Unauthorized("Remote API".to_string()),
            ApiError::Status { status, body } if status.as_u16() == 404 => {
                AppError::NotFound(body)
            }
            other => AppError::Network(other.to_string()),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
