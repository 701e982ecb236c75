#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod builder;
mod error;
mod level;
#[cfg(test)]
mod mock;
mod platform;
mod queue;
mod scheduler;
mod sync;
mod task;

use core::fmt;

pub use builder::TaskBuilder;
pub use error::{ErrorClass, SchedError};
pub use level::PriorityLevel;
pub use platform::{AddressSpace, AddressSpaceManager, Clock, InputSource, Platform, PreemptionTimer};
pub use queue::ReadyQueues;
pub use scheduler::{ForkResult, ForkSlot, Scheduler, SwitchPlan};
pub use sync::{CriticalGuard, CriticalSection, InterruptMask, NoMask, X86Interrupts};
pub use task::{Descriptor, DescriptorTable, IoHandler, Task, TaskInfo, TaskState};

/// Number of MLFQ levels. Level 0 is dispatched first.
pub const QUEUE_LEVELS: usize = 16;
/// Capacity of a task's descriptor table.
pub const MAX_DESCRIPTORS: usize = 32;
/// Timer ticks between two preemptions.
pub const PREEMPT_INTERVAL_TICKS: u32 = 10;

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// The task the kernel booted on.
    pub const KERNEL: TaskId = TaskId(1);

    pub const fn new(id: u64) -> TaskId {
        TaskId(id)
    }

    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        /// Perpetual kernel service. Never blocks or terminates.
        const SERVICE = 0b00000001;
    }
}
