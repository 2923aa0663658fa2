//! Shared types between the scheduler core and application code.
//!
//! Kept separate from `kern` so that application crates (tasks, board glue)
//! can depend on the small set of types they need to talk about tasks and
//! errors without pulling in the scheduler implementation itself.

#![no_std]

/// Names a task in the registry.
///
/// `TaskId` is a flat 8-bit handle, unlike a generation-checked ID: this
/// core has no task restart/respawn machinery, so there is nothing for a
/// generation counter to guard against. `0` is reserved to mean "no task /
/// came from outside a task" and `0xFF` is reserved to mean "invalid" (the
/// sentinel `add` returns on registry-full, and the value `reset_info`
/// reports once its preserved task id has already been consumed).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct TaskId(pub u8);

impl TaskId {
    /// No task: used as the `source` of a message posted from outside any
    /// task context.
    pub const NONE: Self = Self(0);

    /// Sentinel returned when an identifier cannot be allocated or resolved.
    pub const INVALID: Self = Self(0xFF);

    pub fn is_valid(self) -> bool {
        self != Self::NONE && self != Self::INVALID
    }
}

impl From<u8> for TaskId {
    fn from(x: u8) -> Self {
        Self(x)
    }
}

/// Scheduling priority. Numerically lower values are more important.
///
/// Deliberately does not implement `PartialOrd`/`Ord`: comparing priorities
/// with `<` reads ambiguously (does it mean "more important" or
/// "numerically smaller"?). Use `is_more_important_than` instead.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    pub const NORMAL: Self = Self(8);
    pub const HIGHEST: Self = Self(0);
    pub const LOWEST: Self = Self(15);

    /// Checks if `self` is strictly more important than `other`.
    pub fn is_more_important_than(self, other: Self) -> bool {
        self.0 < other.0
    }
}

/// Log verbosity floor, also used as the level of an individual record.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

/// Classification of why the platform last reset, derived from the raw
/// reset-cause register the platform hands back.
///
/// The raw byte is treated as a small bitmask (the common shape for
/// microcontroller reset-cause registers): bit 0 power-on, bit 1 external
/// pin, bit 2 brown-out, bit 3 watchdog. More than one bit set collapses to
/// `Multiple` rather than picking one arbitrarily.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResetCause {
    Unknown,
    PowerOn,
    External,
    BrownOut,
    Watchdog,
    Multiple,
}

impl ResetCause {
    pub fn from_raw(raw: u8) -> Self {
        match raw.count_ones() {
            0 => ResetCause::Unknown,
            1 => match raw {
                0b0001 => ResetCause::PowerOn,
                0b0010 => ResetCause::External,
                0b0100 => ResetCause::BrownOut,
                0b1000 => ResetCause::Watchdog,
                _ => ResetCause::Unknown,
            },
            _ => ResetCause::Multiple,
        }
    }
}

/// Snapshot of state preserved by the platform across a reset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResetInfo {
    /// The task that was executing when the system last reset, or
    /// `TaskId::INVALID` if none was recorded or it has already been read.
    pub last_task_id: TaskId,
    pub cause: ResetCause,
}

/// Errors the core can report to a caller. All are locally recoverable; the
/// core never panics in response to any of these conditions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedError {
    /// The envelope pool had no free slots.
    PoolExhausted,
    /// The shared message queue (or a task's pending list) was full.
    QueueFull,
    /// The task registry had no free slot for `add`.
    RegistryFull,
    /// A `post` found zero eligible recipients for the given topic/destination.
    NoRecipients,
    /// An operation named a task id that does not exist in the registry.
    InvalidIdentifier,
    /// A `subscribe` named a topic number outside `0..MAX_TOPICS`.
    SubscriptionOutOfRange,
    /// The hardware watchdog expired. Not actually returned at runtime (the
    /// platform resets first); kept here so `ResetCause::Watchdog` has a
    /// matching error-kind name in application code that maps the two.
    WatchdogExpired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_sentinels() {
        assert!(!TaskId::NONE.is_valid());
        assert!(!TaskId::INVALID.is_valid());
        assert!(TaskId(1).is_valid());
    }

    #[test]
    fn priority_ordering_is_inverted() {
        assert!(Priority(0).is_more_important_than(Priority(1)));
        assert!(!Priority(1).is_more_important_than(Priority(0)));
        assert!(!Priority(5).is_more_important_than(Priority(5)));
    }

    #[test]
    fn reset_cause_single_bit() {
        assert_eq!(ResetCause::from_raw(0), ResetCause::Unknown);
        assert_eq!(ResetCause::from_raw(0b0001), ResetCause::PowerOn);
        assert_eq!(ResetCause::from_raw(0b1000), ResetCause::Watchdog);
        assert_eq!(ResetCause::from_raw(0b1001), ResetCause::Multiple);
    }
}
