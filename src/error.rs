use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenMediaError {
    #[error("API key not found in environment (set GEMINI_API_KEY or GOOGLE_AI_KEY)")]
    MissingApiKey,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Gemini API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited by API. Retry after some time.")]
    RateLimited,

    #[error("Invalid response from Gemini API: {0}")]
    InvalidResponse(String),

    #[error("Content blocked: {0}")]
    ContentBlocked(String),

    #[error("Job {name} failed (code {code}): {message}")]
    JobFailed {
        name: String,
        code: i32,
        message: String,
    },

    #[error("Job did not complete within {elapsed:?} ({attempts} status checks)")]
    Timeout { elapsed: Duration, attempts: u32 },

    #[error("Job did not complete after {0} status checks")]
    MaxAttemptsExceeded(u32),

    #[error("Polling cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GenMediaError {
    /// Whether the failure is likely to go away if the same call is made again.
    ///
    /// Nothing in this crate retries on its own; callers use this to decide
    /// how to report or whether to resubmit.
    pub fn is_transient(&self) -> bool {
        match self {
            GenMediaError::RateLimited
            | GenMediaError::NetworkError(_)
            | GenMediaError::Timeout { .. } => true,
            GenMediaError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenMediaError>;

/// Map a non-success HTTP response to an error, consuming the body.
pub(crate) async fn error_for_response(response: reqwest::Response) -> GenMediaError {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return GenMediaError::RateLimited;
    }
    let message = response.text().await.unwrap_or_default();
    GenMediaError::ApiError {
        status: status.as_u16(),
        message,
    }
}
