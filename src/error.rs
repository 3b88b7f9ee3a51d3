//! Error types for the chain store

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The request is malformed; nothing was read from storage.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "Number of confirmations required {confirmations} exceeds current blockchain height {height}"
    )]
    ConfirmationsExceedHeight { confirmations: u32, height: i32 },

    /// A cursor session may only be iterated once.
    #[error("Already iterated")]
    AlreadyIterated,

    /// `next()` was called on a cursor with no remaining rows.
    #[error("No more rows")]
    Exhausted,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A stored row could not be turned back into a block or transaction.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cursor error: {0}")]
    Cursor(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        StoreError::InvalidInput(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    /// True for errors raised before any storage was touched.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidInput(_)
                | StoreError::ConfirmationsExceedHeight { .. }
                | StoreError::AlreadyIterated
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Validation(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, StoreError>;
