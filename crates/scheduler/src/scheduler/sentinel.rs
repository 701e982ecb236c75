use crate::scheduler::Scheduler;
use crate::{Clock, InputSource, TaskState};
use log::debug;

impl Scheduler {
    /// One pass over every queue, waking the tasks whose wait is over. Levels
    /// stay as they are. Returns how many tasks were woken.
    pub fn wake_blocked(&mut self) -> usize {
        let now = self.platform.now();
        let mut input_ready = None;
        let mut woken = 0;
        for task in self.queues.iter() {
            let wake = match task.state() {
                TaskState::WaitingOnTimer { deadline } => now >= deadline,
                TaskState::WaitingOnInput => {
                    *input_ready.get_or_insert_with(|| self.platform.input_ready())
                }
                TaskState::Runnable | TaskState::Zombie => false,
            };
            if wake {
                task.set_state(TaskState::Runnable);
                debug!("Task {} woken at level {}", task.id(), task.level());
                woken += 1;
            }
        }
        woken
    }
}

#[cfg(test)]
mod tests {
    use crate::mock::{self, PARKED};
    use crate::{TaskBuilder, TaskId, TaskState};
    use core::time::Duration;

    #[test]
    fn timer_wait_ends_at_the_deadline() {
        let (mut sched, state) = mock::scheduler();
        let t = Duration::from_millis(1_000);
        state.set_now(t);
        let d = sched.spawn(TaskBuilder::kernel(PARKED, 0).name("d")).unwrap();
        sched.queues.move_to(d, 2).unwrap();
        sched.resume(d).unwrap();
        sched.wait_for_timer(t + Duration::from_millis(50)).unwrap();
        sched.current = TaskId::KERNEL;

        state.set_now(t + Duration::from_millis(49));
        assert_eq!(sched.wake_blocked(), 0);
        assert!(matches!(
            sched.task(d).unwrap().state(),
            TaskState::WaitingOnTimer { .. }
        ));

        state.set_now(t + Duration::from_millis(51));
        assert_eq!(sched.wake_blocked(), 1);
        let task = sched.task(d).unwrap();
        assert_eq!(task.state(), TaskState::Runnable);
        assert_eq!(task.level().index(), 2);
    }

    #[test]
    fn input_waiters_wake_together() {
        let (mut sched, state) = mock::scheduler();
        let a = sched.spawn(TaskBuilder::kernel(PARKED, 0)).unwrap();
        let b = sched.spawn(TaskBuilder::kernel(PARKED, 0)).unwrap();
        for id in [a, b] {
            sched.current = id;
            sched.wait_for_input().unwrap();
        }
        sched.current = TaskId::KERNEL;

        assert_eq!(sched.wake_blocked(), 0);
        state.set_input(true);
        assert_eq!(sched.wake_blocked(), 2);
        assert_eq!(sched.task(a).unwrap().state(), TaskState::Runnable);
        assert_eq!(sched.task(b).unwrap().state(), TaskState::Runnable);
    }

    #[test]
    fn zombies_stay_dead() {
        let (mut sched, state) = mock::scheduler();
        let a = sched.spawn(TaskBuilder::kernel(PARKED, 0)).unwrap();
        sched.current = a;
        sched.terminate_current().unwrap();
        sched.current = TaskId::KERNEL;
        state.set_input(true);
        state.set_now(Duration::from_secs(60));
        assert_eq!(sched.wake_blocked(), 0);
        assert_eq!(sched.task(a).unwrap().state(), TaskState::Zombie);
    }
}
