use crate::task::{Task, TaskAdapter};
use crate::{PriorityLevel, SchedError, TaskId, TaskState, QUEUE_LEVELS};
use alloc::boxed::Box;
use alloc::vec::Vec;
use intrusive_collections::LinkedList;

/// One FIFO per MLFQ level. Every task lives in exactly one of them, the one
/// matching its recorded level. List order is the round-robin order.
pub struct ReadyQueues {
    levels: [LinkedList<TaskAdapter>; QUEUE_LEVELS],
}

impl Default for ReadyQueues {
    fn default() -> Self {
        ReadyQueues::new()
    }
}

impl ReadyQueues {
    pub fn new() -> ReadyQueues {
        ReadyQueues {
            levels: core::array::from_fn(|_| LinkedList::new(TaskAdapter::new())),
        }
    }

    pub(crate) fn push(&mut self, mut task: Box<Task>, level: PriorityLevel) {
        task.level = level;
        self.levels[level.index()].push_back(task);
    }

    /// Appends `task` to the tail of `level`.
    pub fn enqueue(&mut self, task: Box<Task>, level: usize) -> Result<(), SchedError> {
        let level = PriorityLevel::new(level).ok_or(SchedError::InvalidLevel(level))?;
        if self.find(task.id()).is_some() {
            return Err(SchedError::AlreadyQueued(task.id()));
        }
        self.push(task, level);
        Ok(())
    }

    /// Unlinks the task from the queue of its recorded level.
    pub fn dequeue(&mut self, id: TaskId) -> Result<Box<Task>, SchedError> {
        let level = self.find(id).ok_or(SchedError::UnknownTask(id))?.level();
        let missing = SchedError::NotQueued { task: id, level };
        let mut cursor = self.levels[level.index()].front_mut();
        loop {
            match cursor.get().map(Task::id) {
                Some(found) if found == id => return cursor.remove().ok_or(missing),
                Some(_) => cursor.move_next(),
                None => return Err(missing),
            }
        }
    }

    pub fn move_to(&mut self, id: TaskId, level: usize) -> Result<(), SchedError> {
        let level = PriorityLevel::new(level).ok_or(SchedError::InvalidLevel(level))?;
        let task = self.dequeue(id)?;
        self.push(task, level);
        Ok(())
    }

    /// Moves the task one level down and returns where it ended up.
    pub fn demote(&mut self, id: TaskId) -> Result<PriorityLevel, SchedError> {
        let from = self.find(id).ok_or(SchedError::UnknownTask(id))?.level();
        let to = from.demoted();
        if to != from {
            self.move_to(id, to.index())?;
        }
        Ok(to)
    }

    /// Moves the task one level up and returns where it ended up.
    pub fn promote(&mut self, id: TaskId) -> Result<PriorityLevel, SchedError> {
        let from = self.find(id).ok_or(SchedError::UnknownTask(id))?.level();
        let to = from.promoted();
        if to != from {
            self.move_to(id, to.index())?;
        }
        Ok(to)
    }

    pub fn find(&self, id: TaskId) -> Option<&Task> {
        self.iter().find(|task| task.id() == id)
    }

    /// All tasks, top level first, queue order within a level.
    pub fn iter(&self) -> impl Iterator<Item = &Task> + '_ {
        self.levels.iter().flat_map(|list| list.iter())
    }

    pub fn level(&self, level: PriorityLevel) -> impl Iterator<Item = &Task> + '_ {
        self.levels[level.index()].iter()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(LinkedList::is_empty)
    }

    pub fn first_runnable_level(&self) -> Option<PriorityLevel> {
        PriorityLevel::all().find(|level| self.level(*level).any(is_runnable))
    }

    /// Next runnable task of `level` in round-robin order after `after`,
    /// wrapping to the front. `after` itself is the last candidate. When
    /// `after` is not in this level the first runnable task wins.
    pub fn next_runnable(&self, level: PriorityLevel, after: TaskId) -> Option<TaskId> {
        let list = &self.levels[level.index()];
        let candidate = match list.iter().position(|task| task.id() == after) {
            Some(pos) => list
                .iter()
                .skip(pos + 1)
                .chain(list.iter().take(pos + 1))
                .find(|task| is_runnable(task)),
            None => list.iter().find(|task| is_runnable(task)),
        };
        candidate.map(Task::id)
    }

    /// Unlinks every zombie except `keep`, preserving the order of the rest.
    pub(crate) fn remove_zombies(&mut self, keep: TaskId) -> Vec<Box<Task>> {
        let mut removed = Vec::new();
        for list in self.levels.iter_mut() {
            let mut cursor = list.front_mut();
            loop {
                match cursor.get().map(|task| (task.id(), task.state())) {
                    Some((id, TaskState::Zombie)) if id != keep => removed.extend(cursor.remove()),
                    Some(_) => cursor.move_next(),
                    None => break,
                }
            }
        }
        removed
    }
}

fn is_runnable(task: &Task) -> bool {
    task.state() == TaskState::Runnable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AddressSpace, TaskFlags};
    use kestrel_context::Continuation;
    use kestrel_memory_stack::StackBuffer;
    use x86_64::structures::paging::PhysFrame;
    use x86_64::{PhysAddr, VirtAddr};

    fn task(id: u64) -> Box<Task> {
        Task::new(
            TaskId::new(id),
            format!("t{}", id),
            TaskFlags::empty(),
            AddressSpace::new(PhysFrame::containing_address(PhysAddr::new(0x1000))),
            StackBuffer::boot(VirtAddr::new(0x10_0000), VirtAddr::new(0x11_0000)),
            Continuation::empty(),
        )
    }

    fn ids(queues: &ReadyQueues, level: usize) -> Vec<u64> {
        queues
            .level(PriorityLevel::new(level).unwrap())
            .map(|t| t.id().as_u64())
            .collect()
    }

    fn id(n: u64) -> TaskId {
        TaskId::new(n)
    }

    #[test]
    fn enqueue_appends_and_records_level() {
        let mut queues = ReadyQueues::new();
        queues.enqueue(task(1), 3).unwrap();
        queues.enqueue(task(2), 3).unwrap();
        assert_eq!(ids(&queues, 3), [1, 2]);
        assert_eq!(queues.find(id(2)).unwrap().level().index(), 3);
        assert_eq!(queues.len(), 2);
    }

    #[test]
    fn enqueue_rejects_bad_level_and_duplicates() {
        let mut queues = ReadyQueues::new();
        assert_eq!(queues.enqueue(task(1), 16), Err(SchedError::InvalidLevel(16)));
        queues.enqueue(task(1), 0).unwrap();
        assert_eq!(queues.enqueue(task(1), 4), Err(SchedError::AlreadyQueued(id(1))));
        assert_eq!(queues.len(), 1);
    }

    #[test]
    fn dequeue_reports_missing_tasks() {
        let mut queues = ReadyQueues::new();
        assert_eq!(queues.dequeue(id(7)).unwrap_err(), SchedError::UnknownTask(id(7)));

        // recorded level 3, linked into level 5
        let mut stray = task(8);
        stray.level = PriorityLevel::new(3).unwrap();
        queues.levels[5].push_back(stray);
        assert_eq!(
            queues.dequeue(id(8)).unwrap_err(),
            SchedError::NotQueued {
                task: id(8),
                level: PriorityLevel::new(3).unwrap()
            }
        );
    }

    #[test]
    fn move_keeps_exactly_one_membership() {
        let mut queues = ReadyQueues::new();
        queues.enqueue(task(1), 0).unwrap();
        queues.enqueue(task(2), 0).unwrap();
        queues.move_to(id(1), 6).unwrap();
        assert_eq!(ids(&queues, 0), [2]);
        assert_eq!(ids(&queues, 6), [1]);
        assert_eq!(queues.find(id(1)).unwrap().level().index(), 6);
        assert_eq!(queues.move_to(id(1), 99), Err(SchedError::InvalidLevel(99)));
        assert_eq!(ids(&queues, 6), [1]);
    }

    #[test]
    fn demote_and_promote_stop_at_the_ends() {
        let mut queues = ReadyQueues::new();
        queues.enqueue(task(1), 14).unwrap();
        assert_eq!(queues.demote(id(1)).unwrap(), PriorityLevel::BOTTOM);
        assert_eq!(queues.demote(id(1)).unwrap(), PriorityLevel::BOTTOM);
        assert_eq!(ids(&queues, 15), [1]);

        queues.enqueue(task(2), 1).unwrap();
        assert_eq!(queues.promote(id(2)).unwrap(), PriorityLevel::TOP);
        assert_eq!(queues.promote(id(2)).unwrap(), PriorityLevel::TOP);
        assert_eq!(ids(&queues, 0), [2]);
    }

    #[test]
    fn round_robin_wraps_after_current() {
        let mut queues = ReadyQueues::new();
        for n in 1..=4 {
            queues.enqueue(task(n), 2).unwrap();
        }
        queues.find(id(4)).unwrap().set_state(TaskState::WaitingOnInput);
        let level = PriorityLevel::new(2).unwrap();

        assert_eq!(queues.first_runnable_level(), Some(level));
        assert_eq!(queues.next_runnable(level, id(1)), Some(id(2)));
        assert_eq!(queues.next_runnable(level, id(3)), Some(id(1)));
        // not in this level: first runnable
        assert_eq!(queues.next_runnable(level, id(42)), Some(id(1)));
    }

    #[test]
    fn lone_runnable_task_selects_itself() {
        let mut queues = ReadyQueues::new();
        queues.enqueue(task(1), 0).unwrap();
        queues.enqueue(task(2), 0).unwrap();
        queues.find(id(2)).unwrap().set_state(TaskState::Zombie);
        assert_eq!(queues.next_runnable(PriorityLevel::TOP, id(1)), Some(id(1)));
    }

    #[test]
    fn no_runnable_level_when_everything_waits() {
        let mut queues = ReadyQueues::new();
        queues.enqueue(task(1), 0).unwrap();
        queues.find(id(1)).unwrap().set_state(TaskState::WaitingOnInput);
        assert_eq!(queues.first_runnable_level(), None);
    }

    #[test]
    fn zombies_are_removed_without_reordering_others() {
        let mut queues = ReadyQueues::new();
        for n in 1..=5 {
            queues.enqueue(task(n), 0).unwrap();
        }
        queues.enqueue(task(6), 9).unwrap();
        for n in [2, 4, 5, 6] {
            queues.find(id(n)).unwrap().set_state(TaskState::Zombie);
        }

        let removed: Vec<u64> = queues
            .remove_zombies(id(5))
            .iter()
            .map(|t| t.id().as_u64())
            .collect();
        assert_eq!(removed, [2, 4, 6]);
        assert_eq!(ids(&queues, 0), [1, 3, 5]);
        assert!(ids(&queues, 9).is_empty());
    }
}
