use devory_storage::StorageError;
use thiserror::Error;

pub type AllocationResult<T> = Result<T, AllocationError>;

/// Typed outcomes of allocator operations.
///
/// Every business-rule variant is checked before any write happens, so an
/// error means nothing was persisted and no notification was sent.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("join request quota exceeded for user {0}")]
    RateLimited(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("post {0} does not accept collaborators")]
    InvalidPostType(String),

    #[error("owners cannot join their own post {0}")]
    SelfJoinForbidden(String),

    #[error("a join request already exists for post {0}")]
    DuplicateRequest(String),

    #[error("post {0} is closed")]
    Closed(String),

    #[error("post {0} has no open slots")]
    Full(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl AllocationError {
    /// Stable machine-readable code for callers mapping errors to messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AllocationError::RateLimited(_) => "RATE_LIMITED",
            AllocationError::NotFound(_) => "NOT_FOUND",
            AllocationError::InvalidPostType(_) => "INVALID_POST_TYPE",
            AllocationError::SelfJoinForbidden(_) => "SELF_JOIN_FORBIDDEN",
            AllocationError::DuplicateRequest(_) => "DUPLICATE_REQUEST",
            AllocationError::Closed(_) => "CLOSED",
            AllocationError::Full(_) => "FULL",
            AllocationError::Unauthorized(_) => "UNAUTHORIZED",
            AllocationError::InvalidState(_) => "INVALID_STATE",
            AllocationError::InvalidInput(_) => "INVALID_INPUT",
            AllocationError::Conflict(_) => "CONFLICT",
            AllocationError::Timeout(_) => "TIMEOUT",
            AllocationError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Only store contention is worth retrying; business rules will not
    /// change without new input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AllocationError::Conflict(_) | AllocationError::Timeout(_)
        )
    }
}

impl From<StorageError> for AllocationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => AllocationError::NotFound(msg),
            StorageError::Conflict(msg) => AllocationError::Conflict(msg),
            StorageError::Timeout(msg) => AllocationError::Timeout(msg),
            StorageError::InvariantViolation(msg) => AllocationError::InvalidState(msg),
            StorageError::InvalidInput(msg) => AllocationError::InvalidInput(msg),
            other => AllocationError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_retryable() {
        assert!(AllocationError::Conflict("x".into()).is_retryable());
        assert!(AllocationError::Timeout("x".into()).is_retryable());
        assert!(!AllocationError::Full("x".into()).is_retryable());
        assert!(!AllocationError::InvalidState("x".into()).is_retryable());
    }

    #[test]
    fn storage_errors_keep_their_meaning() {
        let err: AllocationError = StorageError::Timeout("lock".into()).into();
        assert_eq!(err.kind(), "TIMEOUT");
        let err: AllocationError = StorageError::Backend("down".into()).into();
        assert_eq!(err.kind(), "STORAGE_ERROR");
    }
}
