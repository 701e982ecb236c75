use crate::QUEUE_LEVELS;
use core::fmt;

/// MLFQ level of a task. Lower is dispatched first.
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Debug, Hash)]
#[repr(transparent)]
pub struct PriorityLevel(u8);

impl Default for PriorityLevel {
    fn default() -> Self {
        PriorityLevel::TOP
    }
}

impl PriorityLevel {
    pub const TOP: PriorityLevel = PriorityLevel(0);
    pub const BOTTOM: PriorityLevel = PriorityLevel(QUEUE_LEVELS as u8 - 1);

    pub fn new(level: usize) -> Option<PriorityLevel> {
        if level < QUEUE_LEVELS {
            Some(PriorityLevel(level as u8))
        } else {
            None
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// One level lower, staying at [`PriorityLevel::BOTTOM`].
    pub fn demoted(&self) -> PriorityLevel {
        if *self == Self::BOTTOM {
            *self
        } else {
            PriorityLevel(self.0 + 1)
        }
    }

    /// One level higher, staying at [`PriorityLevel::TOP`].
    pub fn promoted(&self) -> PriorityLevel {
        PriorityLevel(self.0.saturating_sub(1))
    }

    pub fn all() -> impl Iterator<Item = PriorityLevel> {
        (0..QUEUE_LEVELS as u8).map(PriorityLevel)
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
