use crate::TaskFlags;
use alloc::string::String;
use kestrel_context::TaskEntry;
use kestrel_memory_stack::KERNEL_STACK_SIZE;

pub struct TaskBuilder {
    pub(crate) name: Option<String>,
    pub(crate) flags: TaskFlags,
    pub(crate) stack_size: usize,
    pub(crate) entry: TaskEntry,
    pub(crate) arg: usize,
}

impl TaskBuilder {
    /// A kernel task whose first dispatch calls `entry(arg)` on a fresh stack.
    pub fn kernel(entry: TaskEntry, arg: usize) -> Self {
        TaskBuilder {
            name: None,
            flags: TaskFlags::empty(),
            stack_size: KERNEL_STACK_SIZE,
            entry,
            arg,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn service(mut self) -> Self {
        self.flags.set(TaskFlags::SERVICE, true);
        self
    }
}
