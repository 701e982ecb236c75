//! Services the scheduler consumes from the rest of the kernel.

use core::time::Duration;
use x86_64::structures::paging::PhysFrame;

/// A virtual address space, identified by its root page table. Each task
/// owns exactly one.
#[derive(Debug, Eq, PartialEq)]
pub struct AddressSpace(PhysFrame);

impl AddressSpace {
    pub const fn new(root: PhysFrame) -> AddressSpace {
        AddressSpace(root)
    }

    #[inline]
    pub fn root(&self) -> PhysFrame {
        self.0
    }
}

pub trait AddressSpaceManager {
    /// Deep copy of `space`. Later writes to either one are invisible to the other.
    fn duplicate(&mut self, space: &AddressSpace) -> AddressSpace;

    /// Makes `space` the mapping the CPU translates through.
    fn activate(&mut self, space: &AddressSpace);

    /// Reclaims the space of a destroyed task.
    fn release(&mut self, space: AddressSpace);
}

pub trait Clock {
    /// Time since boot.
    fn now(&self) -> Duration;
}

pub trait InputSource {
    fn input_ready(&self) -> bool;
}

pub trait PreemptionTimer {
    /// Calls `callback` every `interval_ticks` timer ticks. The driver has to
    /// acknowledge the interrupt before calling, since `callback` may switch
    /// to another task.
    fn register_periodic(&mut self, interval_ticks: u32, callback: fn());
}

pub trait Platform: AddressSpaceManager + Clock + InputSource + PreemptionTimer + Send {}

impl<T> Platform for T where T: AddressSpaceManager + Clock + InputSource + PreemptionTimer + Send {}
