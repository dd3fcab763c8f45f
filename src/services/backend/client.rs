//! Backend user-management interface.
use async_trait::async_trait;
use thiserror::Error;

use crate::services::backend::account::BackendAccount;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend transport error: {0}")]
    Transport(String),
    #[error("backend rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("backend timed out")]
    Timeout,
}

impl BackendError {
    /// Transport failures, timeouts and 5xx answers may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport(_) | BackendError::Timeout => true,
            BackendError::Rejected { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

#[async_trait]
pub trait UserManager: Send + Sync + 'static {
    /// Creates or fully replaces the account for `username`.
    async fn upsert(&self, username: &str, account: &BackendAccount) -> Result<(), BackendError>;
}
