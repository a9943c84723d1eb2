// src/error.rs
use thiserror::Error;

/// Failure classes for calls against the backend store. The raw backend
/// message is preserved so callers can surface it verbatim.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed backend response: {0}")]
    Decode(String),

    #[error("not authenticated")]
    Unauthorized,

    #[error("role {role:?} is not allowed to {action}")]
    Forbidden { role: crate::types::UserType, action: &'static str },
}
