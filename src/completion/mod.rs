//! Completion cells and the caller-side futures that read them.

pub mod cell;
pub mod future;

pub use cell::{completion_pair, Completer, CompletionCell};
pub use future::{BridgeFuture, Wait};

use crate::marshal::ErrorPayload;

/// The single result of one operation.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Success(T),
    Failure(ErrorPayload),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

impl<T> From<Result<T, ErrorPayload>> for Outcome<T> {
    fn from(result: Result<T, ErrorPayload>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => Outcome::Failure(error),
        }
    }
}

/// Lifecycle of an operation. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationState {
    Submitted = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
}

impl OperationState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => OperationState::Submitted,
            1 => OperationState::Running,
            2 => OperationState::Succeeded,
            _ => OperationState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }
}
