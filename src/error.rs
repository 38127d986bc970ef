//! Error kinds and their NSI wire error-id mapping.
//!
//! Every kind carries a stable error id from the NSI CS 2.0 numbering so a
//! `serviceException` can be built from any error, and inbound exceptions can
//! be mapped back through [`NsiError::from_wire`].

use thiserror::Error;

// =============================================================================
// WIRE ERROR IDS
// =============================================================================

pub const PAYLOAD_ERROR: &str = "00100";
pub const CONNECTION_ERROR: &str = "00200";
pub const INVALID_TRANSITION: &str = "00201";
pub const CONNECTION_NONEXISTENT: &str = "00203";
pub const CONNECTION_GONE: &str = "00204";
pub const INTERNAL_ERROR: &str = "00500";
pub const RESERVE_ERROR: &str = "00600";
pub const PROVISION_ERROR: &str = "00601";
pub const RELEASE_ERROR: &str = "00602";
pub const CANCEL_ERROR: &str = "00603";
pub const TERMINATE_ERROR: &str = "00604";
pub const EMPTY_LABEL_SET: &str = "00703";

/// How an aggregate operation failed across its children.
///
/// A `Partial` failure means at least one segment committed before another
/// failed; the peer networks holding the committed segments require manual
/// cleanup. `Total` means every segment failed and nothing was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Partial,
    Total,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NsiError {
    /// Illegal lifecycle transition. Always local, rejected synchronously
    /// before anything is sent downstream.
    #[error("state transition from {from} to {to} not allowed")]
    StateTransition { from: &'static str, to: &'static str },

    /// Malformed label, STP, or criteria on the wire.
    #[error("payload error: {0}")]
    Payload(String),

    /// Label intersection yielded no common values.
    #[error("label intersection produced an empty label set")]
    EmptyLabelSet,

    /// Reservation fan-out failed.
    #[error("{message}")]
    Reserve { mode: FailureMode, message: String },

    /// Provision fan-out failed.
    #[error("{message}")]
    Provision { mode: FailureMode, message: String },

    /// Release fan-out failed.
    #[error("{message}")]
    Release { mode: FailureMode, message: String },

    /// Cancel-reservation fan-out failed.
    #[error("{message}")]
    CancelReservation { mode: FailureMode, message: String },

    /// Peer reported a terminate failure.
    #[error("terminate failed: {0}")]
    Terminate(String),

    /// Inbound callback referenced an unknown connection id.
    #[error("connection {0} does not exist")]
    ConnectionNonExistent(String),

    /// Inbound callback referenced a connection that has been terminated
    /// and released by its requester.
    #[error("connection {0} is gone")]
    ConnectionGone(String),

    /// Generic connection-level error. Also the fallback kind for wire
    /// error ids with no registry entry.
    #[error("connection error: {0}")]
    Connection(String),

    /// Catch-all for backend faults not matched above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NsiError {
    /// Stable wire error id for this kind.
    pub fn error_id(&self) -> &'static str {
        match self {
            NsiError::StateTransition { .. } => INVALID_TRANSITION,
            NsiError::Payload(_) => PAYLOAD_ERROR,
            NsiError::EmptyLabelSet => EMPTY_LABEL_SET,
            NsiError::Reserve { .. } => RESERVE_ERROR,
            NsiError::Provision { .. } => PROVISION_ERROR,
            NsiError::Release { .. } => RELEASE_ERROR,
            NsiError::CancelReservation { .. } => CANCEL_ERROR,
            NsiError::Terminate(_) => TERMINATE_ERROR,
            NsiError::ConnectionNonExistent(_) => CONNECTION_NONEXISTENT,
            NsiError::ConnectionGone(_) => CONNECTION_GONE,
            NsiError::Connection(_) => CONNECTION_ERROR,
            NsiError::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// True when the aggregate failure left committed segments behind.
    pub fn needs_manual_cleanup(&self) -> bool {
        matches!(
            self,
            NsiError::Reserve { mode: FailureMode::Partial, .. }
                | NsiError::Provision { mode: FailureMode::Partial, .. }
                | NsiError::Release { mode: FailureMode::Partial, .. }
                | NsiError::CancelReservation { mode: FailureMode::Partial, .. }
        )
    }

    /// Map an inbound `serviceException` error id to an error kind.
    ///
    /// Aggregation ids are reported by peers as total failures of the
    /// corresponding operation. Unknown ids collapse to the generic
    /// connection error.
    pub fn from_wire(error_id: &str, text: &str) -> NsiError {
        let message = text.to_string();
        match error_id {
            PAYLOAD_ERROR => NsiError::Payload(message),
            INVALID_TRANSITION => {
                // the offending states live only in the peer's text
                NsiError::Connection(message)
            }
            CONNECTION_NONEXISTENT => NsiError::ConnectionNonExistent(message),
            CONNECTION_GONE => NsiError::ConnectionGone(message),
            INTERNAL_ERROR => NsiError::Internal(message),
            RESERVE_ERROR => NsiError::Reserve { mode: FailureMode::Total, message },
            PROVISION_ERROR => NsiError::Provision { mode: FailureMode::Total, message },
            RELEASE_ERROR => NsiError::Release { mode: FailureMode::Total, message },
            CANCEL_ERROR => NsiError::CancelReservation { mode: FailureMode::Total, message },
            TERMINATE_ERROR => NsiError::Terminate(message),
            EMPTY_LABEL_SET => NsiError::EmptyLabelSet,
            _ => NsiError::Connection(message),
        }
    }
}
