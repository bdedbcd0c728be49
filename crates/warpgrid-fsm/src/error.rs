//! Error types for the state machine engine.

use thiserror::Error;

/// Result type alias for state machine operations.
pub type FsmResult<T> = Result<T, FsmError>;

/// Errors returned by [`Fsm`](crate::Fsm) operations.
///
/// Both variants are local: the machine is unchanged when either is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsmError {
    #[error("transition from {from} to {to} is not allowed")]
    StateNotAllowed { from: String, to: String },

    #[error("record {record} is not the current record (current is {current})")]
    InvalidState { record: u64, current: u64 },
}
