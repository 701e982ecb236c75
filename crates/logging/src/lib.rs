#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::boxed::Box;
use core::any::TypeId;
use core::fmt::{Display, Write};
use core::panic::PanicInfo;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::{Mutex, Once};

/// Writer type of the installed logger, so `panic` never reinterprets a
/// logger of another type.
static INSTALLED: Once<TypeId> = Once::new();

pub struct Logger<T> {
    level: LevelFilter,
    writer: Mutex<T>,
}

impl<T: Write + Send + Sync + 'static> Logger<T> {
    pub fn new(target: T) -> Logger<T> {
        Logger {
            level: LevelFilter::Info,
            writer: Mutex::new(target),
        }
    }

    pub fn set_max_level(mut self, level: LevelFilter) -> Logger<T> {
        self.level = level;
        self
    }

    pub fn max_level(&self) -> LevelFilter {
        self.level
    }

    pub fn into_inner(self) -> T {
        self.writer.into_inner()
    }

    /// Installs the logger for the rest of the kernel's life.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let level = self.level;
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(level);
        INSTALLED.call_once(TypeId::of::<T>);
        Ok(())
    }

    /// The installed logger, if it writes to a `T`.
    pub fn installed() -> Option<&'static Logger<T>> {
        if INSTALLED.get() != Some(&TypeId::of::<T>()) {
            return None;
        }
        Some(unsafe { &*(log::logger() as *const dyn Log as *const Logger<T>) })
    }

    pub fn panic(info: &PanicInfo) {
        if let Some(logger) = Self::installed() {
            logger.write_panic(info);
        }
    }

    /// Writes even if the panicking code held the writer.
    fn write_panic(&self, message: &dyn Display) {
        if self.writer.is_locked() {
            unsafe {
                self.writer.force_unlock();
            }
        }
        let mut w = self.writer.lock();
        let _ = writeln!(w, "PANIC! {}", message);
    }
}

impl<T: Write + Send + Sync> Log for Logger<T> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let target = if !record.target().is_empty() {
            record.target()
        } else {
            record.module_path().unwrap_or_default()
        };

        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "[{}] {} {}", record.level(), target, record.args());
    }

    fn flush(&self) {}
}
