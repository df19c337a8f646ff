//! Error types for line card management.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

use crate::linecard::SlotIndex;

/// Result type alias for line card operations.
pub type LinecardResult<T> = Result<T, LinecardError>;

/// Errors that can occur while tracking line card slots.
#[derive(Debug, Error)]
pub enum LinecardError {
    /// A request to the hardware transport did not complete.
    #[error("Transport {operation} failed for slot {slot}: {message}")]
    Transport {
        /// The register operation (e.g., "slot_info_query", "activate").
        operation: String,
        /// The slot the request addressed (0 for chassis-wide requests).
        slot: SlotIndex,
        /// Error message.
        message: String,
    },

    /// The status record answered for a different slot than was asked.
    #[error("Slot mismatch: expected slot {expected}, hardware reported slot {actual}")]
    SlotMismatch {
        /// The slot that was queried.
        expected: SlotIndex,
        /// The slot index carried by the response.
        actual: SlotIndex,
    },

    /// A status record named a slot the chassis does not have.
    #[error("Slot {slot} out of range (chassis has {count} slots)")]
    SlotOutOfRange {
        /// The offending slot index.
        slot: SlotIndex,
        /// Number of slots in the chassis.
        count: u8,
    },

    /// A status payload could not be decoded.
    #[error("Malformed slot status: {message}")]
    Malformed {
        /// Error message.
        message: String,
    },

    /// A subscriber refused to provision a slot.
    #[error("Subscriber rejected provisioning of slot {slot}: {message}")]
    Subscriber {
        /// The slot being provisioned.
        slot: SlotIndex,
        /// Error message.
        message: String,
    },

    /// Allocation for a registry entry failed.
    #[error("Resource exhausted: {what}")]
    ResourceExhausted {
        /// What could not be allocated.
        what: String,
    },

    /// Teardown was requested while subscribers were still registered.
    #[error("{count} linecard event subscribers still registered at teardown")]
    SubscribersRemaining {
        /// Number of registered subscribers.
        count: usize,
    },

    /// The scan driver is no longer accepting work.
    #[error("Line card scan driver has shut down")]
    Shutdown,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl LinecardError {
    /// Creates a transport error.
    pub fn transport(
        operation: impl Into<String>,
        slot: SlotIndex,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            operation: operation.into(),
            slot,
            message: message.into(),
        }
    }

    /// Creates a subscriber provisioning error.
    pub fn subscriber(slot: SlotIndex, message: impl Into<String>) -> Self {
        Self::Subscriber {
            slot,
            message: message.into(),
        }
    }

    /// Creates a malformed payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Returns true if the error came from the hardware transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = LinecardError::transport("slot_info_query", 3, "bus timeout");
        assert_eq!(
            err.to_string(),
            "Transport slot_info_query failed for slot 3: bus timeout"
        );
        assert!(err.is_transport());
    }

    #[test]
    fn test_slot_mismatch_display() {
        let err = LinecardError::SlotMismatch {
            expected: 2,
            actual: 5,
        };
        assert_eq!(
            err.to_string(),
            "Slot mismatch: expected slot 2, hardware reported slot 5"
        );
        assert!(!err.is_transport());
    }

    #[test]
    fn test_subscriber_error_display() {
        let err = LinecardError::subscriber(1, "no ports found");
        assert_eq!(
            err.to_string(),
            "Subscriber rejected provisioning of slot 1: no ports found"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "i2c timeout");
        let err: LinecardError = io_err.into();
        assert!(matches!(err, LinecardError::Io(_)));
        assert!(err.is_transport());
    }
}
