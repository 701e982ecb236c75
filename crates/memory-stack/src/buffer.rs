use crate::STACK_ALIGN;
use alloc::boxed::Box;
use alloc::vec;
use core::fmt;
use core::ops::Range;
use x86_64::VirtAddr;

/// Memory a task runs its kernel code on.
pub enum StackBuffer {
    /// The stack the kernel was booted on. Owned by the boot code, never
    /// freed and never written through this type.
    Boot { bottom: VirtAddr, top: VirtAddr },
    Heap(Box<[u8]>),
}

impl StackBuffer {
    pub const fn boot(bottom: VirtAddr, top: VirtAddr) -> Self {
        StackBuffer::Boot { bottom, top }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        match self {
            StackBuffer::Boot { bottom, top } => (top.as_u64() - bottom.as_u64()) as usize,
            StackBuffer::Heap(buf) => buf.len(),
        }
    }

    #[inline]
    pub fn bottom(&self) -> VirtAddr {
        match self {
            StackBuffer::Boot { bottom, .. } => *bottom,
            StackBuffer::Heap(buf) => VirtAddr::from_ptr(buf.as_ptr()),
        }
    }

    /// Highest usable address, aligned for the System V ABI.
    #[inline]
    pub fn top(&self) -> VirtAddr {
        let end = self.bottom().as_u64() + self.capacity() as u64;
        VirtAddr::new_truncate(end).align_down(STACK_ALIGN)
    }

    pub fn range(&self) -> Range<VirtAddr> {
        self.bottom()..self.top()
    }

    pub fn contains(&self, addr: VirtAddr) -> bool {
        self.range().contains(&addr)
    }

    fn word_offset(&self, addr: VirtAddr) -> Option<usize> {
        let offset = addr.as_u64().checked_sub(self.bottom().as_u64())? as usize;
        if offset.checked_add(8)? > self.capacity() {
            return None;
        }
        Some(offset)
    }

    pub fn read_word(&self, addr: VirtAddr) -> Option<u64> {
        let StackBuffer::Heap(buf) = self else {
            return None;
        };
        let offset = self.word_offset(addr)?;
        let bytes = buf.get(offset..offset + 8)?.try_into().ok()?;
        Some(u64::from_ne_bytes(bytes))
    }

    pub fn write_word(&mut self, addr: VirtAddr, value: u64) -> bool {
        let Some(offset) = self.word_offset(addr) else {
            return false;
        };
        let StackBuffer::Heap(buf) = self else {
            return false;
        };
        buf[offset..offset + 8].copy_from_slice(&value.to_ne_bytes());
        true
    }

    /// Walks the saved frame-pointer chain of a stack copied from `source`
    /// starting at `frame` (already inside this buffer) and shifts every
    /// link that still points into `source` by `delta`.
    ///
    /// Stops at the first link leaving `source` or not climbing toward the
    /// top. Returns how many links were rewritten.
    pub fn relocate_frame_chain(
        &mut self,
        frame: VirtAddr,
        source: &Range<VirtAddr>,
        delta: u64,
    ) -> usize {
        let mut relocated = 0;
        let mut frame = frame;
        while let Some(saved) = self.read_word(frame) {
            let saved = VirtAddr::new_truncate(saved);
            if !source.contains(&saved) {
                break;
            }
            let moved = VirtAddr::new_truncate(saved.as_u64().wrapping_add(delta));
            if moved <= frame || !self.write_word(frame, moved.as_u64()) {
                break;
            }
            relocated += 1;
            frame = moved;
        }
        relocated
    }
}

impl fmt::Debug for StackBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            StackBuffer::Boot { .. } => "boot",
            StackBuffer::Heap(_) => "heap",
        };
        write!(f, "StackBuffer({} {:?}..{:?})", kind, self.bottom(), self.top())
    }
}

pub fn new_buffer(size: usize) -> StackBuffer {
    StackBuffer::Heap(vec![0u8; size].into_boxed_slice())
}
