#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod buffer;

pub const KERNEL_STACK_SIZE: usize = 80 * 1024; // 80 KiB
pub const STACK_ALIGN: u64 = 16;

pub use buffer::{new_buffer, StackBuffer};
