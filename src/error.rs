//! Runtime error codes and the pending-exception slot.
//!
//! Real compiled code would unwind its native stack back to the host
//! boundary on a thrown exception; with no code generator in this crate
//! there is no stack to unwind. `Runtime::throw` instead records the error
//! on the heap and returns `nil`, matching the one observable part of that
//! contract: "control returns to the host boundary as if the managed call
//! had returned null."

use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RuntimeErrorCode {
    #[error("operand does not coerce to a number")]
    NotANumber,
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
}
