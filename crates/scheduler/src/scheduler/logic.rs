use crate::scheduler::Scheduler;
use crate::{AddressSpaceManager, SchedError, TaskId, TaskState};
use kestrel_context::Continuation;
use log::trace;

/// A dispatch decision: the continuation slot the outgoing task saves into
/// and the one the CPU loads next.
#[derive(Debug)]
pub struct SwitchPlan {
    from: TaskId,
    to: TaskId,
    save: *mut Continuation,
    load: *const Continuation,
}

impl SwitchPlan {
    pub fn from(&self) -> TaskId {
        self.from
    }

    pub fn to(&self) -> TaskId {
        self.to
    }

    pub fn save(&self) -> *mut Continuation {
        self.save
    }

    pub fn load(&self) -> *const Continuation {
        self.load
    }
}

impl Scheduler {
    /// Picks the task to run next. A current task that is still runnable is
    /// being preempted and loses one level first.
    pub fn select_next(&mut self) -> Result<TaskId, SchedError> {
        if self.current_task()?.state() == TaskState::Runnable {
            let level = self.queues.demote(self.current)?;
            trace!("task {} preempted at level {}", self.current, level);
        }
        let level = self
            .queues
            .first_runnable_level()
            .ok_or(SchedError::NoRunnableTask)?;
        self.queues
            .next_runnable(level, self.current)
            .ok_or(SchedError::NoRunnableTask)
    }

    /// Makes `target` the current task. Returns `None` when it already is.
    ///
    /// The caller has to carry out the returned plan before leaving the
    /// critical section.
    pub fn resume(&mut self, target: TaskId) -> Result<Option<SwitchPlan>, SchedError> {
        let to = self
            .queues
            .find(target)
            .ok_or(SchedError::UnknownTask(target))?;
        let state = to.state();
        if state != TaskState::Runnable {
            return Err(SchedError::NotRunnable {
                task: target,
                state,
            });
        }
        if target == self.current {
            return Ok(None);
        }
        let from = self
            .queues
            .find(self.current)
            .ok_or(SchedError::UnknownTask(self.current))?;
        let plan = SwitchPlan {
            from: from.id(),
            to: target,
            save: from.context_ptr(),
            load: to.context_ptr(),
        };
        if from.space().root() != to.space().root() {
            self.platform.activate(to.space());
        }
        trace!("switching {} -> {}", plan.from, plan.to);
        self.current = target;
        Ok(Some(plan))
    }

    pub fn schedule(&mut self) -> Result<Option<SwitchPlan>, SchedError> {
        let next = self.select_next()?;
        self.resume(next)
    }
}
