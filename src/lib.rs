//! Preemptive multitasking for the kernel.
//!
//! One process-wide [`Scheduler`] lives behind a critical section. Every
//! operation here enters it once, asks the scheduler what to do and, when a
//! task has to give up the CPU, performs the switch before leaving. The task
//! resumed by a switch is the one that leaves the section.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod services;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::mem;
use core::time::Duration;
use kestrel_scheduler::{CriticalSection, SchedError, TaskBuilder};
use log::{error, info, trace};

pub use kestrel_logging::Logger;
pub use kestrel_memory_stack::{StackBuffer, KERNEL_STACK_SIZE};
pub use kestrel_scheduler::{
    AddressSpace, AddressSpaceManager, Clock, Descriptor, ForkResult, InputSource, IoHandler,
    Platform, PreemptionTimer, PriorityLevel, Scheduler, TaskFlags, TaskId, TaskInfo, TaskState,
    PREEMPT_INTERVAL_TICKS, QUEUE_LEVELS,
};

#[cfg(not(test))]
type KernelMask = kestrel_scheduler::X86Interrupts;
#[cfg(test)]
type KernelMask = kestrel_scheduler::NoMask;

static TASKING: CriticalSection<Option<Scheduler>, KernelMask> = CriticalSection::new(None);

fn fatal(op: &str, err: SchedError) -> ! {
    error!("{} failed: {} ({:?})", op, err, err.class());
    panic!("{}: {}", op, err)
}

fn not_installed(op: &str) -> ! {
    error!("{} called before tasking was installed", op);
    panic!("{}: tasking not installed", op)
}

/// Adopts the running code as the kernel task and starts the background
/// services and preemption. Does nothing when already installed.
pub fn init(platform: Box<dyn Platform>, boot_space: AddressSpace, boot_stack: StackBuffer) {
    let mut tasking = TASKING.enter();
    if tasking.is_some() {
        return;
    }
    let mut scheduler = Scheduler::new(platform, boot_space, boot_stack);
    for service in services::builders() {
        scheduler.spawn(service).unwrap_or_else(|e| fatal("init", e));
    }
    scheduler.register_preemption(PREEMPT_INTERVAL_TICKS, preempt);
    *tasking = Some(scheduler);
    info!("Tasking installed");
}

pub fn is_installed() -> bool {
    TASKING.enter().is_some()
}

fn with_scheduler<R>(
    op: &'static str,
    f: impl FnOnce(&mut Scheduler) -> Result<R, SchedError>,
) -> R {
    let mut tasking = TASKING.enter();
    match tasking.as_mut() {
        Some(scheduler) => f(scheduler).unwrap_or_else(|e| fatal(op, e)),
        None => not_installed(op),
    }
}

/// Applies `f` to the current task and dispatches, in one critical section.
/// Returns `false` without doing anything before installation.
fn switch_away(
    op: &'static str,
    f: impl FnOnce(&mut Scheduler) -> Result<(), SchedError>,
) -> bool {
    let mut tasking = TASKING.enter();
    let Some(scheduler) = tasking.as_mut() else {
        return false;
    };
    let plan = f(&mut *scheduler)
        .and_then(|()| scheduler.schedule())
        .unwrap_or_else(|e| fatal(op, e));
    if let Some(plan) = plan {
        unsafe {
            kestrel_context::switch(plan.save(), plan.load());
        }
    }
    drop(tasking);
    true
}

/// Creates a task that runs `entry` on its own stack and terminates when
/// `entry` returns.
pub fn create_task(name: &str, entry: fn()) -> TaskId {
    spawn(TaskBuilder::kernel(services::task_start, entry as usize).name(name))
}

pub fn spawn(builder: TaskBuilder) -> TaskId {
    with_scheduler("create_task", |scheduler| scheduler.spawn(builder))
}

/// Duplicates the calling task. Both tasks continue from here: the caller
/// gets [`ForkResult::Parent`] with the new id, the copy gets
/// [`ForkResult::Child`].
///
/// # Safety
/// The copy runs on a copy of the caller's stack. Only the frame-pointer
/// chain is rebased, so the kernel has to be built with frame pointers and
/// the caller must not hold references into its own stack across the call.
pub unsafe fn fork(name: &str) -> ForkResult {
    let mut tasking = TASKING.enter();
    let Some(scheduler) = tasking.as_mut() else {
        not_installed("fork");
    };
    let slot = scheduler.begin_fork(name).unwrap_or_else(|e| fatal("fork", e));
    let outcome = kestrel_context::fork_into(
        slot.continuation_ptr(),
        slot.source_top(),
        slot.target_top(),
    );
    if outcome.is_resumed() {
        // the parent already queued the record this copy of `slot` owns
        mem::forget(slot);
        drop(tasking);
        return ForkResult::Child;
    }
    let child = scheduler.finish_fork(slot).unwrap_or_else(|e| fatal("fork", e));
    drop(tasking);
    ForkResult::Parent(child)
}

/// Blocks the current task until uptime reaches `deadline`.
pub fn block_on_timer(deadline: Duration) {
    switch_away("block_on_timer", |scheduler| scheduler.wait_for_timer(deadline));
}

/// Blocks the current task for `duration`. `Duration::MAX` sleeps until
/// explicitly unblocked.
pub fn sleep(duration: Duration) {
    switch_away("sleep", |scheduler| scheduler.wait_for(duration));
}

/// Blocks the current task until the input device has data.
pub fn block_on_input() {
    switch_away("block_on_input", |scheduler| scheduler.wait_for_input());
}

/// Makes a waiting task runnable. Returns whether it was waiting.
pub fn unblock(task: TaskId) -> bool {
    let mut tasking = TASKING.enter();
    match tasking.as_mut() {
        Some(scheduler) => scheduler
            .unblock(task)
            .unwrap_or_else(|e| fatal("unblock", e)),
        None => false,
    }
}

pub fn terminate_self() -> ! {
    if !switch_away("terminate_self", |scheduler| scheduler.terminate_current()) {
        not_installed("terminate_self");
    }
    unreachable!("terminated task was resumed")
}

pub fn yield_now() {
    switch_away("yield_now", |_| Ok(()));
}

/// Timer callback. The interrupt has been acknowledged by the time it runs.
pub fn preempt() {
    trace!("preemption tick");
    switch_away("preempt", |_| Ok(()));
}

pub fn current_task_id() -> TaskId {
    with_scheduler("current_task_id", |scheduler| Ok(scheduler.current()))
}

/// Adds `descriptor` to the current task's table and returns its index.
pub fn install_descriptor(descriptor: Descriptor) -> usize {
    with_scheduler("install_descriptor", |scheduler| {
        scheduler.install_descriptor(descriptor)
    })
}

pub fn dump(out: &mut dyn fmt::Write) -> fmt::Result {
    with_scheduler("dump", |scheduler| Ok(scheduler.dump(out)))
}

pub fn snapshot() -> Vec<TaskInfo> {
    with_scheduler("snapshot", |scheduler| Ok(scheduler.snapshot()))
}
