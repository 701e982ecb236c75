use crate::{AddressSpace, PriorityLevel, TaskFlags, TaskId, MAX_DESCRIPTORS};
use alloc::boxed::Box;
use alloc::string::String;
use arrayvec::ArrayVec;
use core::cell::{Cell, RefCell, UnsafeCell};
use core::fmt;
use core::time::Duration;
use intrusive_collections::{intrusive_adapter, LinkedListLink};
use kestrel_context::Continuation;
use kestrel_memory_stack::StackBuffer;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskState {
    Runnable,
    /// Woken once uptime reaches `deadline`.
    WaitingOnTimer { deadline: Duration },
    WaitingOnInput,
    /// Finished, waiting for the reaper.
    Zombie,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Runnable => write!(f, "runnable"),
            TaskState::WaitingOnTimer { deadline } => {
                write!(f, "waiting on timer, wakes at {}ms", deadline.as_millis())
            }
            TaskState::WaitingOnInput => write!(f, "waiting on input"),
            TaskState::Zombie => write!(f, "zombie"),
        }
    }
}

/// Reads into or writes from the buffer, returning the byte count.
pub type IoHandler = fn(&mut [u8]) -> usize;

#[derive(Clone, Copy)]
pub enum Descriptor {
    Stdin,
    Stdout,
    Stderr,
    Handler(IoHandler),
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Stdin => write!(f, "Stdin"),
            Descriptor::Stdout => write!(f, "Stdout"),
            Descriptor::Stderr => write!(f, "Stderr"),
            Descriptor::Handler(handler) => write!(f, "Handler({:p})", *handler as *const ()),
        }
    }
}

#[derive(Debug)]
pub struct DescriptorTable(ArrayVec<Descriptor, MAX_DESCRIPTORS>);

impl Default for DescriptorTable {
    fn default() -> Self {
        let mut table = ArrayVec::new();
        table.push(Descriptor::Stdin);
        table.push(Descriptor::Stdout);
        table.push(Descriptor::Stderr);
        DescriptorTable(table)
    }
}

impl DescriptorTable {
    pub fn get(&self, index: usize) -> Option<Descriptor> {
        self.0.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends `descriptor` and returns its index, or `None` when full.
    pub fn install(&mut self, descriptor: Descriptor) -> Option<usize> {
        self.0.try_push(descriptor).ok()?;
        Some(self.0.len() - 1)
    }
}

pub struct Task {
    link: LinkedListLink,
    id: TaskId,
    name: String,
    flags: TaskFlags,
    pub(crate) level: PriorityLevel,
    state: Cell<TaskState>,
    context: UnsafeCell<Continuation>,
    pub(crate) space: AddressSpace,
    pub(crate) stack: StackBuffer,
    descriptors: RefCell<DescriptorTable>,
}

intrusive_adapter!(pub TaskAdapter = Box<Task>: Task { link: LinkedListLink });

impl Task {
    pub(crate) fn new(
        id: TaskId,
        name: String,
        flags: TaskFlags,
        space: AddressSpace,
        stack: StackBuffer,
        context: Continuation,
    ) -> Box<Task> {
        Box::new(Task {
            link: LinkedListLink::new(),
            id,
            name,
            flags,
            level: PriorityLevel::TOP,
            state: Cell::new(TaskState::Runnable),
            context: UnsafeCell::new(context),
            space,
            stack,
            descriptors: RefCell::new(DescriptorTable::default()),
        })
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    pub fn is_service(&self) -> bool {
        self.flags.contains(TaskFlags::SERVICE)
    }

    #[inline]
    pub fn level(&self) -> PriorityLevel {
        self.level
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.set(state);
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn stack(&self) -> &StackBuffer {
        &self.stack
    }

    /// Copy of the saved continuation. Meaningless while the task runs.
    pub fn continuation(&self) -> Continuation {
        unsafe { *self.context.get() }
    }

    pub(crate) fn context_ptr(&self) -> *mut Continuation {
        self.context.get()
    }

    pub(crate) fn context_mut(&mut self) -> &mut Continuation {
        self.context.get_mut()
    }

    pub fn descriptor(&self, index: usize) -> Option<Descriptor> {
        self.descriptors.borrow().get(index)
    }

    pub(crate) fn install_descriptor(&self, descriptor: Descriptor) -> Option<usize> {
        self.descriptors.borrow_mut().install(descriptor)
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            name: self.name.clone(),
            level: self.level,
            state: self.state(),
            flags: self.flags,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("level", &self.level)
            .field("state", &self.state())
            .finish()
    }
}

/// Point-in-time view of one task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub level: PriorityLevel,
    pub state: TaskState,
    pub flags: TaskFlags,
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (queue {}) ({})",
            self.id, self.name, self.level, self.state
        )
    }
}
