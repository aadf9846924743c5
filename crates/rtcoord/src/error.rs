//! Error types shared across the crate.

use thiserror::Error;

use crate::task::{Priority, TaskId};

/// Outcome of a coordination primitive that did not complete.
///
/// Neither variant is a fault: a timed-out wait is ordinary control flow for
/// callers that chose a finite timeout.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// The wait condition was not satisfied before the timeout elapsed.
    #[error("operation timed out")]
    Timeout,
    /// A non-blocking call found nothing to take.
    #[error("operation would block")]
    WouldBlock,
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised while assembling or driving a kernel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("task {0:?} already registered")]
    DuplicateTaskId(TaskId),
    #[error("task {0:?} not found")]
    TaskNotFound(TaskId),
    #[error("invalid priority {priority:?}: {reason}")]
    InvalidPriority {
        priority: Priority,
        reason: &'static str,
    },
    #[error("too many tasks: limit is {max}")]
    TooManyTasks { max: usize },
    #[error("kernel already started")]
    AlreadyStarted,
}

/// Errors reported by an actuator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    #[error("actuator device is not ready")]
    NotReady,
    #[error("configuration rejected (code {0})")]
    Rejected(i32),
}

pub type ActuatorResult<T> = Result<T, ActuatorError>;
