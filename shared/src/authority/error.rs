use thiserror::Error;

/// Errors that can occur while reading or updating an object's authority view
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    /// Authority state lock is poisoned (a panic occurred while it was held)
    #[error("Authority state lock is poisoned - this indicates a panic occurred while holding the lock")]
    LockPoisoned,

    /// Invalid authority state transition
    #[error("Invalid authority transition for object {object}: {from_state} -> {to_state} via {operation}")]
    InvalidTransition {
        object: String,
        from_state: &'static str,
        to_state: &'static str,
        operation: &'static str,
    },
}
