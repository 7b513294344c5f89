//! Error types for the list adapter.

use listsync_core::DispatchError;

/// Errors returned by adapter, store and selection operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A selection larger than the configured maximum was requested.
    ///
    /// The current selection is left unchanged.
    #[error("selection of {requested} items exceeds the maximum of {max}")]
    InvalidSelection { requested: usize, max: usize },

    /// A position outside the displayed list was requested.
    #[error("position {position} is out of range for {count} displayed items")]
    OutOfRange { position: usize, count: usize },

    /// Work could not be handed to an execution context.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// A specialized Result type for list adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidSelection {
            requested: 3,
            max: 2,
        };
        assert_eq!(err.to_string(), "selection of 3 items exceeds the maximum of 2");

        let err = Error::OutOfRange {
            position: 5,
            count: 2,
        };
        assert_eq!(
            err.to_string(),
            "position 5 is out of range for 2 displayed items"
        );
    }

    #[test]
    fn test_dispatch_error_converts() {
        let err: Error = DispatchError::ApplyClosed.into();
        assert_eq!(err, Error::Dispatch(DispatchError::ApplyClosed));
        assert_eq!(err.to_string(), "apply context is closed");
    }
}
