// src/api/types.rs
// Backend API Types and Error Definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of `POST /start`
#[derive(Debug, Clone, Serialize)]
pub struct StartRequest<'a> {
    pub conversation_id: &'a str,
}

/// Response of `POST /start`. Older servers answer `{}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StartResponse {
    pub conversation_id: Option<String>,
}

/// Backend error types with retry classification
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response body: {0}")]
    InvalidBody(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Returns true if the same request may succeed later
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout => true,
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::InvalidBody(_) | ApiError::InvalidUrl(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(e.to_string())
        }
    }
}
