//! Saved machine state of a suspended task and the primitives that move the
//! CPU between such states.
//!
//! A [`Continuation`] holds the callee-saved registers of the System V ABI,
//! the stack pointer, the instruction pointer to resume at and a return
//! slot. Everything a caller-saved register held is dead at the call site of
//! [`switch`], so nothing else needs to be kept. Resuming a continuation is
//! always an explicit jump to its saved instruction pointer with the return
//! slot loaded into `rdx`; there is no reserved value in the data path.
#![cfg_attr(not(test), no_std)]

use core::arch::global_asm;
use core::ops::Range;
use x86_64::VirtAddr;

global_asm!(include_str!("switch.s"));

/// First code a fresh task runs. Receives the argument given to
/// [`Continuation::entry`].
pub type TaskEntry = extern "C" fn(usize) -> !;

extern "C" {
    fn kestrel_context_switch(save: *mut Continuation, load: *const Continuation);
    fn kestrel_context_restore(load: *const Continuation) -> !;
    fn kestrel_context_fork(
        child: *mut Continuation,
        source_top: u64,
        target_top: u64,
    ) -> Resumption;
    fn kestrel_context_entry();
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Continuation {
    rsp: u64,
    rbp: u64,
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
    rip: u64,
    ret: u64,
}

impl Continuation {
    pub const fn empty() -> Self {
        Continuation {
            rsp: 0,
            rbp: 0,
            rbx: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rip: 0,
            ret: 0,
        }
    }

    /// Continuation of a task that has never run: resuming it calls
    /// `entry(arg)` on the stack ending at `stack_top`.
    pub fn entry(stack_top: VirtAddr, entry: TaskEntry, arg: usize) -> Self {
        Continuation {
            rsp: stack_top.align_down(16u64).as_u64(),
            r12: entry as usize as u64,
            r13: arg as u64,
            rip: kestrel_context_entry as usize as u64,
            ..Continuation::empty()
        }
    }

    pub fn from_parts(ip: VirtAddr, sp: VirtAddr, fp: VirtAddr) -> Self {
        Continuation {
            rsp: sp.as_u64(),
            rbp: fp.as_u64(),
            rip: ip.as_u64(),
            ..Continuation::empty()
        }
    }

    #[inline]
    pub fn instruction_pointer(&self) -> VirtAddr {
        VirtAddr::new_truncate(self.rip)
    }

    #[inline]
    pub fn stack_pointer(&self) -> VirtAddr {
        VirtAddr::new_truncate(self.rsp)
    }

    #[inline]
    pub fn frame_pointer(&self) -> VirtAddr {
        VirtAddr::new_truncate(self.rbp)
    }

    /// Value the resumed code observes as [`Resumption::value`].
    #[inline]
    pub fn return_value(&self) -> u64 {
        self.ret
    }

    pub fn set_return_value(&mut self, value: u64) {
        self.ret = value;
    }

    /// Shifts the stack and frame pointer by `delta` (wrapping) if they
    /// point into `source`. Used after the stack they refer to was copied
    /// elsewhere.
    pub fn relocate(&mut self, source: &Range<VirtAddr>, delta: u64) {
        if source.contains(&self.stack_pointer()) {
            self.rsp = self.rsp.wrapping_add(delta);
        }
        if source.contains(&self.frame_pointer()) {
            self.rbp = self.rbp.wrapping_add(delta);
        }
    }
}

/// What [`fork_into`] returned on this path.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Resumption {
    resumed: u64,
    value: u64,
}

impl Resumption {
    /// `false` on the capturing path, `true` once the captured continuation
    /// was resumed by [`switch`] or [`restore`].
    #[inline]
    pub fn is_resumed(&self) -> bool {
        self.resumed != 0
    }

    /// Return slot of the resumed continuation, zero on the capturing path.
    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Saves the running context into `save` and resumes `load`. Returns when
/// some later switch resumes `save`.
///
/// # Safety
/// `load` must hold a continuation produced by [`switch`], [`fork_into`] or
/// [`Continuation::entry`] whose stack is still alive, and both pointers
/// must be valid for the duration of the call.
#[inline]
pub unsafe fn switch(save: *mut Continuation, load: *const Continuation) {
    kestrel_context_switch(save, load)
}

/// Resumes `load` without saving the running context.
///
/// # Safety
/// Same as [`switch`]; the current stack is abandoned.
#[inline]
pub unsafe fn restore(load: *const Continuation) -> ! {
    kestrel_context_restore(load)
}

/// Captures the running context into `child` and copies the live part of
/// the current stack (from the stack pointer up to `source_top`) to the same
/// offsets below `target_top`.
///
/// Returns twice: once right away with [`Resumption::is_resumed`] unset, and
/// once more on the copied stack when `child` is resumed. The stack and
/// frame pointer stored in `child` still refer to the source stack; call
/// [`Continuation::relocate`] before resuming it.
///
/// # Safety
/// `source_top` must be the top of the stack currently in use and
/// `target_top` the top of a stack at least as large. Only the frame-pointer
/// chain can be rebased afterwards: any other pointer into the source stack
/// held by the caller's frames keeps pointing there on the copy.
#[inline(always)]
pub unsafe fn fork_into(
    child: *mut Continuation,
    source_top: VirtAddr,
    target_top: VirtAddr,
) -> Resumption {
    kestrel_context_fork(child, source_top.as_u64(), target_top.as_u64())
}
