//! The capability set the core needs from the board: clocks, a watchdog,
//! reset-cause memory, and the ability to mask interrupts.
//!
//! Interrupt masking itself is not a method on this trait: the core calls
//! [`critical_section::with`] directly wherever it needs to mutate the
//! shared queue or an envelope's reference count, and the board registers
//! its own [`critical_section::Impl`] the same way `userlib`'s
//! `critical_section.rs` does. That keeps the one genuinely cross-context
//! operation backed by the crate built for it instead of threading a
//! closure-taking method through every `Platform` impl.

use abi::TaskId;

pub trait Platform {
    /// Monotonic milliseconds since boot. Wraparound-permitted.
    fn now_ms(&self) -> u32;

    /// Monotonic microseconds, best-effort precision, used only for
    /// execution-time profiling.
    fn now_us(&self) -> u32;

    /// Arms the watchdog with a platform-defined timeout code. Platforms
    /// without a watchdog peripheral leave this a no-op.
    fn watchdog_enable(&self, _timeout_code: u8) {}

    /// Feeds (pets) the watchdog. Called once per tick by the scheduler
    /// when watchdog integration is enabled.
    fn watchdog_feed(&self) {}

    /// Raw reset-cause register value, read once at startup.
    fn reset_cause_raw(&self) -> u8 {
        0
    }

    /// Reads and clears the task id preserved across the last reset. Must
    /// return `TaskId::INVALID.0` both when nothing was preserved and on
    /// every call after the first (the value is one-shot).
    fn take_last_task_preserved(&self) -> u8 {
        TaskId::INVALID.0
    }

    /// Best-effort free-heap estimate in bytes, for diagnostics. `0` means
    /// "unknown" on platforms with no heap or no introspection.
    fn free_heap_bytes(&self) -> u32 {
        0
    }

    /// Best-effort largest contiguous free heap block, in bytes.
    fn largest_free_block(&self) -> u32 {
        0
    }

    /// Best-effort count of distinct free heap blocks, for fragmentation
    /// diagnostics. `0` means "unknown", same as the other heap hooks.
    fn free_fragment_count(&self) -> u32 {
        0
    }

    /// Best-effort estimate of unused stack space, in bytes.
    fn stack_headroom(&self) -> u32 {
        0
    }
}

impl<'a, P: Platform + ?Sized> Platform for &'a P {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
    fn now_us(&self) -> u32 {
        (**self).now_us()
    }
    fn watchdog_enable(&self, timeout_code: u8) {
        (**self).watchdog_enable(timeout_code)
    }
    fn watchdog_feed(&self) {
        (**self).watchdog_feed()
    }
    fn reset_cause_raw(&self) -> u8 {
        (**self).reset_cause_raw()
    }
    fn take_last_task_preserved(&self) -> u8 {
        (**self).take_last_task_preserved()
    }
    fn free_heap_bytes(&self) -> u32 {
        (**self).free_heap_bytes()
    }
    fn largest_free_block(&self) -> u32 {
        (**self).largest_free_block()
    }
    fn free_fragment_count(&self) -> u32 {
        (**self).free_fragment_count()
    }
    fn stack_headroom(&self) -> u32 {
        (**self).stack_headroom()
    }
}

#[cfg(test)]
pub mod testing {
    use super::Platform;
    use core::cell::Cell;

    /// A [`Platform`] for host unit tests: the clock only moves when the
    /// test advances it explicitly, mirroring the way Hubris keeps an
    /// `arch::simulator` backend around for host-side testing instead of
    /// exercising real hardware.
    pub struct TestPlatform {
        ms: Cell<u32>,
        us: Cell<u32>,
        reset_cause: Cell<u8>,
        last_task: Cell<u8>,
        watchdog_fed: Cell<u32>,
    }

    impl TestPlatform {
        pub fn new() -> Self {
            TestPlatform {
                ms: Cell::new(0),
                us: Cell::new(0),
                reset_cause: Cell::new(0),
                last_task: Cell::new(abi::TaskId::INVALID.0),
                watchdog_fed: Cell::new(0),
            }
        }

        pub fn advance_ms(&self, delta: u32) {
            self.ms.set(self.ms.get().wrapping_add(delta));
            self.us.set(self.us.get().wrapping_add(delta * 1000));
        }

        pub fn set_reset_cause(&self, raw: u8, last_task: u8) {
            self.reset_cause.set(raw);
            self.last_task.set(last_task);
        }

        pub fn watchdog_feed_count(&self) -> u32 {
            self.watchdog_fed.get()
        }
    }

    impl Default for TestPlatform {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Platform for TestPlatform {
        fn now_ms(&self) -> u32 {
            self.ms.get()
        }

        fn now_us(&self) -> u32 {
            self.us.get()
        }

        fn watchdog_feed(&self) {
            self.watchdog_fed.set(self.watchdog_fed.get() + 1);
        }

        fn reset_cause_raw(&self) -> u8 {
            self.reset_cause.get()
        }

        fn take_last_task_preserved(&self) -> u8 {
            self.last_task.replace(abi::TaskId::INVALID.0)
        }
    }

    pub struct NoopCriticalSection;

    unsafe impl critical_section::Impl for NoopCriticalSection {
        unsafe fn acquire() -> critical_section::RawRestoreState {}

        unsafe fn release(_token: critical_section::RawRestoreState) {}
    }
}
