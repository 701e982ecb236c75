//! Background tasks that keep the scheduler going.

use crate::{yield_now, TASKING};
use kestrel_scheduler::TaskBuilder;
use log::trace;

/// First code of every task made by `create_task`. `arg` is the `fn()` to run.
pub(crate) extern "C" fn task_start(arg: usize) -> ! {
    // the task that switched here still holds the critical section
    unsafe {
        TASKING.release_inherited();
    }
    let entry = unsafe { core::mem::transmute::<usize, fn()>(arg) };
    entry();
    crate::terminate_self()
}

pub(crate) fn builders() -> [TaskBuilder; 3] {
    [
        service("idle", idle),
        service("reaper", reaper),
        service("iosentinel", sentinel),
    ]
}

fn service(name: &str, body: fn()) -> TaskBuilder {
    TaskBuilder::kernel(task_start, body as usize)
        .name(name)
        .service()
}

/// Always runnable, so dispatch always finds something.
fn idle() {
    loop {
        core::hint::spin_loop();
    }
}

fn reaper() {
    loop {
        if let Some(scheduler) = TASKING.enter().as_mut() {
            let reaped = scheduler.reap();
            if reaped > 0 {
                trace!("reaped {} tasks", reaped);
            }
        }
        yield_now();
    }
}

fn sentinel() {
    loop {
        if let Some(scheduler) = TASKING.enter().as_mut() {
            let woken = scheduler.wake_blocked();
            if woken > 0 {
                trace!("woke {} tasks", woken);
            }
        }
        yield_now();
    }
}
