//! Error types for the simulation engine.
//!
//! Three families are kept apart:
//! - Corruption: stored or generated data that cannot be interpreted
//! - Cognition: failures of the pluggable judgment capability (see [`crate::cognition`])
//! - Invariant: logic states that should be impossible

use crate::cognition::CognitionError;
use crate::maze::TilePos;
use crate::persist::PersistError;

/// Main error type for persona simulation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed address, waiting argument, grid data or node record
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// A logic invariant was violated
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Behavior that has no defined policy yet
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// No route between two tiles within the search budget
    #[error("No path from {from} to {to}")]
    Pathfind { from: TilePos, to: TilePos },

    /// Judgment call failed after retries, or failed fatally
    #[error("Cognition error: {0}")]
    Cognition(#[from] CognitionError),

    /// Loading or saving simulation state failed
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Corruption("bad path".to_string());
        assert_eq!(err.to_string(), "Corrupt data: bad path");

        let err = Error::Pathfind {
            from: TilePos::new(1, 2),
            to: TilePos::new(3, 4),
        };
        assert_eq!(err.to_string(), "No path from (1, 2) to (3, 4)");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = CognitionError::Validation("empty".to_string()).into();
        assert!(matches!(err, Error::Cognition(_)));
    }
}
