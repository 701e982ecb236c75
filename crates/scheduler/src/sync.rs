use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use spin::{Mutex, MutexGuard};
use x86_64::instructions::interrupts;

/// How a critical section keeps interrupt handlers out.
pub trait InterruptMask {
    /// Masks interrupts and reports whether they were enabled before.
    fn mask() -> bool;

    fn unmask();
}

pub struct X86Interrupts;

impl InterruptMask for X86Interrupts {
    fn mask() -> bool {
        let enabled = interrupts::are_enabled();
        if enabled {
            interrupts::disable();
        }
        enabled
    }

    fn unmask() {
        interrupts::enable();
    }
}

/// For hosted builds where nothing can interrupt.
pub struct NoMask;

impl InterruptMask for NoMask {
    fn mask() -> bool {
        false
    }

    fn unmask() {}
}

/// Exclusive access to `T` with interrupts masked. Not reentrant: entering
/// a section that is already held is fatal.
pub struct CriticalSection<T, M: InterruptMask = X86Interrupts> {
    inner: Mutex<T>,
    mask: PhantomData<fn() -> M>,
}

impl<T, M: InterruptMask> CriticalSection<T, M> {
    pub const fn new(value: T) -> Self {
        CriticalSection {
            inner: Mutex::new(value),
            mask: PhantomData,
        }
    }

    pub fn enter(&self) -> CriticalGuard<'_, T, M> {
        let unmask_on_exit = M::mask();
        match self.inner.try_lock() {
            Some(guard) => CriticalGuard {
                guard: ManuallyDrop::new(guard),
                unmask_on_exit,
                mask: PhantomData,
            },
            None => panic!("critical section re-entered"),
        }
    }

    pub fn is_held(&self) -> bool {
        self.inner.is_locked()
    }

    /// Leaves the section that the task which switched to us entered.
    ///
    /// # Safety
    /// Only for the first code a fresh task runs. A switch happens with the
    /// section held and is normally left by the resumed task dropping its own
    /// guard; a task that never ran has no guard to drop.
    pub unsafe fn release_inherited(&self) {
        self.inner.force_unlock();
        M::unmask();
    }
}

pub struct CriticalGuard<'a, T, M: InterruptMask> {
    guard: ManuallyDrop<MutexGuard<'a, T>>,
    unmask_on_exit: bool,
    mask: PhantomData<fn() -> M>,
}

impl<T, M: InterruptMask> Deref for CriticalGuard<'_, T, M> {
    type Target = T;

    fn deref(&self) -> &T {
        &**self.guard
    }
}

impl<T, M: InterruptMask> DerefMut for CriticalGuard<'_, T, M> {
    fn deref_mut(&mut self) -> &mut T {
        &mut **self.guard
    }
}

impl<T, M: InterruptMask> Drop for CriticalGuard<'_, T, M> {
    fn drop(&mut self) {
        // unlock before an interrupt can observe the lock
        unsafe {
            ManuallyDrop::drop(&mut self.guard);
        }
        if self.unmask_on_exit {
            M::unmask();
        }
    }
}
