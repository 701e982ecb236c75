//! Hosted stand-ins for the kernel services a scheduler needs.

use crate::{AddressSpace, AddressSpaceManager, Clock, InputSource, PreemptionTimer, Scheduler};
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use core::time::Duration;
use hashbrown::HashMap;
use kestrel_context::TaskEntry;
use kestrel_memory_stack::StackBuffer;
use spin::Mutex;
use x86_64::structures::paging::PhysFrame;
use x86_64::{PhysAddr, VirtAddr};

pub const BOOT_FRAME: u64 = 0x1000;
pub const BOOT_STACK_BOTTOM: u64 = 0x40_0000;
pub const BOOT_STACK_TOP: u64 = 0x41_0000;

pub struct MockState {
    now: Mutex<Duration>,
    input: AtomicBool,
    next_frame: AtomicU64,
    memory: Mutex<HashMap<u64, HashMap<u64, u8>>>,
    pub activated: Mutex<Vec<u64>>,
    pub released: Mutex<Vec<u64>>,
    pub periodic: Mutex<Vec<u32>>,
}

impl MockState {
    pub fn set_now(&self, now: Duration) {
        *self.now.lock() = now;
    }

    pub fn set_input(&self, ready: bool) {
        self.input.store(ready, Ordering::SeqCst);
    }

    pub fn write(&self, space: &AddressSpace, addr: u64, value: u8) {
        self.memory
            .lock()
            .entry(root(space))
            .or_default()
            .insert(addr, value);
    }

    pub fn read(&self, space: &AddressSpace, addr: u64) -> Option<u8> {
        self.memory.lock().get(&root(space))?.get(&addr).copied()
    }
}

pub struct MockPlatform(Arc<MockState>);

impl MockPlatform {
    pub fn new() -> (MockPlatform, Arc<MockState>) {
        let state = Arc::new(MockState {
            now: Mutex::new(Duration::ZERO),
            input: AtomicBool::new(false),
            next_frame: AtomicU64::new(0x10_0000),
            memory: Mutex::new(HashMap::new()),
            activated: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
            periodic: Mutex::new(Vec::new()),
        });
        (MockPlatform(state.clone()), state)
    }
}

impl AddressSpaceManager for MockPlatform {
    fn duplicate(&mut self, space: &AddressSpace) -> AddressSpace {
        let copy = self.0.next_frame.fetch_add(0x1000, Ordering::SeqCst);
        let mut memory = self.0.memory.lock();
        let bytes = memory.get(&root(space)).cloned().unwrap_or_default();
        memory.insert(copy, bytes);
        AddressSpace::new(frame(copy))
    }

    fn activate(&mut self, space: &AddressSpace) {
        self.0.activated.lock().push(root(space));
    }

    fn release(&mut self, space: AddressSpace) {
        self.0.memory.lock().remove(&root(&space));
        self.0.released.lock().push(root(&space));
    }
}

impl Clock for MockPlatform {
    fn now(&self) -> Duration {
        *self.0.now.lock()
    }
}

impl InputSource for MockPlatform {
    fn input_ready(&self) -> bool {
        self.0.input.load(Ordering::SeqCst)
    }
}

impl PreemptionTimer for MockPlatform {
    fn register_periodic(&mut self, interval_ticks: u32, _callback: fn()) {
        self.0.periodic.lock().push(interval_ticks);
    }
}

pub fn frame(addr: u64) -> PhysFrame {
    PhysFrame::containing_address(PhysAddr::new(addr))
}

pub fn root(space: &AddressSpace) -> u64 {
    space.root().start_address().as_u64()
}

/// Entry point for tasks that are scheduled in tests but never entered.
pub extern "C" fn parked(_: usize) -> ! {
    loop {
        core::hint::spin_loop();
    }
}

pub const PARKED: TaskEntry = parked;

/// A scheduler booted on a fake boot stack, with only the kernel task.
pub fn scheduler() -> (Scheduler, Arc<MockState>) {
    let (platform, state) = MockPlatform::new();
    let scheduler = Scheduler::new(
        Box::new(platform),
        AddressSpace::new(frame(BOOT_FRAME)),
        StackBuffer::boot(VirtAddr::new(BOOT_STACK_BOTTOM), VirtAddr::new(BOOT_STACK_TOP)),
    );
    (scheduler, state)
}
