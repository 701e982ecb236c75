use crate::{
    AddressSpace, Clock, Platform, PreemptionTimer, PriorityLevel, ReadyQueues, SchedError, Task,
    TaskFlags, TaskId, TaskInfo,
};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::{self, Write};
use core::time::Duration;
use kestrel_context::Continuation;
use kestrel_memory_stack::StackBuffer;
use log::info;

mod lifecycle;
mod logic;
mod sentinel;

pub use lifecycle::{ForkResult, ForkSlot};
pub use logic::SwitchPlan;

/// All tasking state: the ready queues, which task owns the CPU and the
/// kernel services the scheduler drives.
pub struct Scheduler {
    queues: ReadyQueues,
    current: TaskId,
    next_id: u64,
    platform: Box<dyn Platform>,
}

// Only reachable through the critical section that owns it.
unsafe impl Send for Scheduler {}

impl Scheduler {
    /// Adopts the running code as the kernel task, current and at level 0.
    pub fn new(
        platform: Box<dyn Platform>,
        boot_space: AddressSpace,
        boot_stack: StackBuffer,
    ) -> Scheduler {
        let mut queues = ReadyQueues::new();
        let kernel = Task::new(
            TaskId::KERNEL,
            "kernel".into(),
            TaskFlags::empty(),
            boot_space,
            boot_stack,
            Continuation::empty(),
        );
        queues.push(kernel, PriorityLevel::TOP);
        Scheduler {
            queues,
            current: TaskId::KERNEL,
            next_id: TaskId::KERNEL.as_u64() + 1,
            platform,
        }
    }

    #[inline]
    pub fn current(&self) -> TaskId {
        self.current
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.queues.find(id)
    }

    pub fn queues(&self) -> &ReadyQueues {
        &self.queues
    }

    pub fn now(&self) -> Duration {
        self.platform.now()
    }

    pub fn register_preemption(&mut self, interval_ticks: u32, callback: fn()) {
        self.platform.register_periodic(interval_ticks, callback);
        info!("Preempting every {} timer ticks", interval_ticks);
    }

    pub(crate) fn current_task(&self) -> Result<&Task, SchedError> {
        self.queues
            .find(self.current)
            .ok_or(SchedError::UnknownTask(self.current))
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn snapshot(&self) -> Vec<TaskInfo> {
        self.queues.iter().map(Task::info).collect()
    }

    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "---- tasks ----")?;
        for task in self.queues.iter() {
            writeln!(out, "{}", task.info())?;
        }
        writeln!(out, "---- end of tasks ----")
    }
}

#[cfg(test)]
mod tests {
    use crate::mock::{self, PARKED};
    use crate::{TaskBuilder, TaskId, TaskState};

    #[test]
    fn boots_with_the_kernel_task_current() {
        let (sched, _) = mock::scheduler();
        assert_eq!(sched.current(), TaskId::KERNEL);
        let kernel = sched.task(TaskId::KERNEL).unwrap();
        assert_eq!(kernel.name(), "kernel");
        assert_eq!(kernel.level().index(), 0);
        assert_eq!(kernel.state(), TaskState::Runnable);
    }

    #[test]
    fn registers_preemption_with_the_timer() {
        let (mut sched, state) = mock::scheduler();
        fn tick() {}
        sched.register_preemption(crate::PREEMPT_INTERVAL_TICKS, tick);
        assert_eq!(*state.periodic.lock(), [10]);
    }

    #[test]
    fn dump_lists_every_task() {
        let (mut sched, _) = mock::scheduler();
        let shell = sched
            .spawn(TaskBuilder::kernel(PARKED, 0).name("shell"))
            .unwrap();
        sched.queues.move_to(shell, 4).unwrap();
        sched.current = shell;
        sched.wait_for_input().unwrap();

        let mut out = String::new();
        sched.dump(&mut out).unwrap();
        assert_eq!(
            out,
            "---- tasks ----\n\
             [1] kernel (queue 0) (runnable)\n\
             [2] shell (queue 4) (waiting on input)\n\
             ---- end of tasks ----\n"
        );

        let snapshot = sched.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].id, shell);
        assert_eq!(snapshot[1].state, TaskState::WaitingOnInput);
    }
}
