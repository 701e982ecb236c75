use crate::{PriorityLevel, TaskId, TaskState};
use core::fmt;

/// Every consistency violation the scheduler detects. None of them is
/// recoverable; callers are expected to halt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedError {
    InvalidLevel(usize),
    AlreadyQueued(TaskId),
    /// The task is not in the queue of its recorded level.
    NotQueued { task: TaskId, level: PriorityLevel },
    UnknownTask(TaskId),
    NotRunnable { task: TaskId, state: TaskState },
    /// A service task tried to block or terminate.
    ServiceTask(TaskId),
    DescriptorTableFull(TaskId),
    NoRunnableTask,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Caller or scheduler bookkeeping broke an invariant.
    Misuse,
    /// Nothing is left to run.
    Starvation,
}

impl SchedError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SchedError::NoRunnableTask => ErrorClass::Starvation,
            _ => ErrorClass::Misuse,
        }
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::InvalidLevel(level) => write!(f, "queue level {} is out of range", level),
            SchedError::AlreadyQueued(task) => write!(f, "task {} is already queued", task),
            SchedError::NotQueued { task, level } => {
                write!(f, "task {} is missing from queue {}", task, level)
            }
            SchedError::UnknownTask(task) => write!(f, "no task with id {}", task),
            SchedError::NotRunnable { task, state } => {
                write!(f, "task {} is not runnable ({})", task, state)
            }
            SchedError::ServiceTask(task) => {
                write!(f, "service task {} cannot block or terminate", task)
            }
            SchedError::DescriptorTableFull(task) => {
                write!(f, "descriptor table of task {} is full", task)
            }
            SchedError::NoRunnableTask => write!(f, "no runnable task in any queue"),
        }
    }
}
