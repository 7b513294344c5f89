//! Error types for listsync execution contexts.

/// Errors raised when work cannot be handed to an execution context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The background worker has been stopped and no longer accepts tasks.
    #[error("background worker has been stopped")]
    WorkerStopped,

    /// Every consumer of the apply context has been dropped or shut down.
    #[error("apply context is closed")]
    ApplyClosed,

    /// The operating system refused to start a thread.
    #[error("failed to spawn thread '{name}': {message}")]
    SpawnFailed { name: String, message: String },
}

impl DispatchError {
    /// Create a spawn failure for the named thread.
    pub fn spawn_failed(name: impl Into<String>, source: &std::io::Error) -> Self {
        Self::SpawnFailed {
            name: name.into(),
            message: source.to_string(),
        }
    }
}

/// A specialized Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_failed_message() {
        let io = std::io::Error::other("no more threads");
        let err = DispatchError::spawn_failed("listsync-diff", &io);
        assert_eq!(
            err.to_string(),
            "failed to spawn thread 'listsync-diff': no more threads"
        );
    }
}
