use crate::scheduler::Scheduler;
use crate::{
    AddressSpaceManager, Clock, Descriptor, PriorityLevel, SchedError, Task, TaskBuilder, TaskFlags,
    TaskId, TaskState,
};
use alloc::boxed::Box;
use alloc::format;
use core::ops::Range;
use core::time::Duration;
use kestrel_context::Continuation;
use kestrel_memory_stack::{new_buffer, KERNEL_STACK_SIZE};
use log::debug;
use x86_64::VirtAddr;

/// Result of a fork, as seen by each of the two tasks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ForkResult {
    Parent(TaskId),
    Child,
}

impl ForkResult {
    /// The child's id for the parent, zero for the child.
    pub fn raw(&self) -> u64 {
        match self {
            ForkResult::Parent(child) => child.as_u64(),
            ForkResult::Child => 0,
        }
    }
}

/// A fork in progress: the child record, not queued yet, and the stack it
/// is being copied from.
pub struct ForkSlot {
    child: Box<Task>,
    source: Range<VirtAddr>,
}

impl ForkSlot {
    pub fn id(&self) -> TaskId {
        self.child.id()
    }

    /// Where the machine layer captures the parent's registers.
    pub fn continuation_ptr(&self) -> *mut Continuation {
        self.child.context_ptr()
    }

    pub fn source_top(&self) -> VirtAddr {
        self.source.end
    }

    pub fn target_top(&self) -> VirtAddr {
        self.child.stack().top()
    }
}

impl Scheduler {
    /// Creates a runnable task at level 0 in a copy of the current task's
    /// address space.
    pub fn spawn(&mut self, builder: TaskBuilder) -> Result<TaskId, SchedError> {
        let id = self.allocate_id();
        let parent = self
            .queues
            .find(self.current)
            .ok_or(SchedError::UnknownTask(self.current))?;
        let space = self.platform.duplicate(parent.space());
        let stack = new_buffer(builder.stack_size);
        let context = Continuation::entry(stack.top(), builder.entry, builder.arg);
        let name = builder.name.unwrap_or_else(|| format!("task-{}", id));
        debug!("Spawning task {} ({}) from {}", id, name, self.current);

        let task = Task::new(id, name, builder.flags, space, stack, context);
        self.queues.enqueue(task, PriorityLevel::TOP.index())?;
        Ok(id)
    }

    /// First half of a fork: builds the child around a copy of the current
    /// task's address space and an empty stack of at least the same size.
    pub fn begin_fork(&mut self, name: &str) -> Result<ForkSlot, SchedError> {
        let id = self.allocate_id();
        let parent = self
            .queues
            .find(self.current)
            .ok_or(SchedError::UnknownTask(self.current))?;
        let space = self.platform.duplicate(parent.space());
        let stack = new_buffer(parent.stack().capacity().max(KERNEL_STACK_SIZE));
        let source = parent.stack().range();

        let child = Task::new(
            id,
            name.into(),
            TaskFlags::empty(),
            space,
            stack,
            Continuation::empty(),
        );
        Ok(ForkSlot { child, source })
    }

    /// Second half of a fork, once the parent's registers and stack were
    /// captured into the slot: points the child at its own stack, makes it
    /// observe zero and queues it.
    pub fn finish_fork(&mut self, slot: ForkSlot) -> Result<TaskId, SchedError> {
        let ForkSlot { mut child, source } = slot;
        let delta = child.stack().top().as_u64().wrapping_sub(source.end.as_u64());

        let context = child.context_mut();
        context.relocate(&source, delta);
        context.set_return_value(0);
        let frame = context.frame_pointer();
        let links = child.stack.relocate_frame_chain(frame, &source, delta);

        let id = child.id();
        debug!(
            "Forked task {} ({}) from {}, {} frames rebased",
            id,
            child.name(),
            self.current,
            links
        );
        self.queues.enqueue(child, PriorityLevel::TOP.index())?;
        Ok(id)
    }

    fn block_current(&mut self, state: TaskState) -> Result<(), SchedError> {
        let task = self.current_task()?;
        if task.is_service() {
            return Err(SchedError::ServiceTask(task.id()));
        }
        task.set_state(state);
        Ok(())
    }

    /// Marks the current task finished. The caller dispatches right after.
    pub fn terminate_current(&mut self) -> Result<(), SchedError> {
        self.block_current(TaskState::Zombie)?;
        debug!("Task {} terminated", self.current);
        Ok(())
    }

    pub fn wait_for_timer(&mut self, deadline: Duration) -> Result<(), SchedError> {
        self.block_current(TaskState::WaitingOnTimer { deadline })
    }

    /// Blocks the current task for `duration` from now. A deadline past the
    /// end of the clock is never reached.
    pub fn wait_for(&mut self, duration: Duration) -> Result<(), SchedError> {
        let deadline = self.platform.now().saturating_add(duration);
        self.wait_for_timer(deadline)
    }

    pub fn wait_for_input(&mut self) -> Result<(), SchedError> {
        self.block_current(TaskState::WaitingOnInput)
    }

    /// Makes a waiting task runnable again without touching its level.
    /// Returns whether it was waiting.
    pub fn unblock(&mut self, id: TaskId) -> Result<bool, SchedError> {
        let task = self.queues.find(id).ok_or(SchedError::UnknownTask(id))?;
        match task.state() {
            TaskState::WaitingOnTimer { .. } | TaskState::WaitingOnInput => {
                task.set_state(TaskState::Runnable);
                debug!("Task {} woken at level {}", id, task.level());
                Ok(true)
            }
            TaskState::Runnable | TaskState::Zombie => Ok(false),
        }
    }

    /// Destroys every zombie but the current task and returns how many went.
    pub fn reap(&mut self) -> usize {
        let zombies = self.queues.remove_zombies(self.current);
        let count = zombies.len();
        for zombie in zombies {
            debug!("Reaping task {} ({})", zombie.id(), zombie.name());
            let Task { space, .. } = *zombie;
            self.platform.release(space);
        }
        count
    }

    pub fn install_descriptor(&mut self, descriptor: Descriptor) -> Result<usize, SchedError> {
        let task = self.current_task()?;
        task.install_descriptor(descriptor)
            .ok_or(SchedError::DescriptorTableFull(task.id()))
    }
}
