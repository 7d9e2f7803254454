//! Errors surfaced at the HTTP boundary.

use serde_json::json;
use thiserror::Error;

use crate::store::uploads::ResumeError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input. Never retried.
    #[error("{0}")]
    Validation(String),

    #[error("Request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error("Not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Database, filesystem or other infrastructure failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::PayloadTooLarge { .. } => 413,
            ApiError::NotFound => 404,
            ApiError::MethodNotAllowed => 405,
            ApiError::Internal(_) => 500,
        }
    }

    /// JSON body for the error. Internal details stay in the log.
    pub fn body(&self) -> serde_json::Value {
        match self {
            ApiError::Internal(_) => json!({ "message": "Server error" }),
            other => json!({ "message": other.to_string() }),
        }
    }
}

impl From<ResumeError> for ApiError {
    fn from(e: ResumeError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_variant() {
        assert_eq!(ApiError::validation("x").status(), 400);
        assert_eq!(ApiError::PayloadTooLarge { limit: 1 }.status(), 413);
        assert_eq!(ApiError::NotFound.status(), 404);
        assert_eq!(ApiError::MethodNotAllowed.status(), 405);
        assert_eq!(ApiError::from(anyhow::anyhow!("disk full")).status(), 500);
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let e = ApiError::from(anyhow::anyhow!("disk full at /var/db"));
        assert_eq!(e.body()["message"], "Server error");
        let v = ApiError::from(ResumeError::NotPdf);
        assert_eq!(v.body()["message"], "Invalid PDF file");
        assert_eq!(v.status(), 400);
    }
}
