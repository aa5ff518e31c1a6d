//! Error types shared across the payroute crates

use thiserror::Error;

/// Errors related to node addressing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Byte slice has the wrong length for this address type
    #[error("Invalid address length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Address bytes do not decode to a valid address
    #[error("Invalid address format: {0}")]
    InvalidFormat(String),
}

/// Errors related to message envelopes
#[derive(Debug, Error)]
pub enum CoreError {
    /// Address error
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Envelope could not be encoded
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Envelope could not be decoded
    #[error("Decoding failed: {0}")]
    Decode(String),

    /// Envelope tag does not match the message it carries
    #[error("Traffic class mismatch: tagged {tagged}, carries {actual}")]
    ClassMismatch {
        tagged: crate::message::TrafficClass,
        actual: crate::message::TrafficClass,
    },
}

/// Result type alias using CoreError
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TrafficClass;

    #[test]
    fn test_identity_error_display() {
        let err = IdentityError::InvalidLength {
            expected: 4,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Invalid address length: expected 4, got 2");
    }

    #[test]
    fn test_class_mismatch_display() {
        let err = CoreError::ClassMismatch {
            tagged: TrafficClass::Hello,
            actual: TrafficClass::Routing,
        };
        assert!(err.to_string().contains("hello"));
        assert!(err.to_string().contains("routing"));
    }
}
