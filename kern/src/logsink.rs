//! Level-filtered, tagged diagnostic log.
//!
//! Rather than reach for the `log` crate's global-logger-and-backend
//! pattern, this follows the same approach `ringbuf` takes in the rest of
//! this codebase: a fixed-capacity, array-backed ring that an external tool
//! inspects after the fact. Message text is `&'static str`, typically a
//! string literal baked into Flash, never a heap `String`; formatting, if
//! any, is the log backend's job, not the sink's.

use abi::{LogLevel, TaskId};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub task: Option<TaskId>,
    pub message: &'static str,
}

pub struct LogSink<const N: usize> {
    records: [Option<LogRecord>; N],
    next: usize,
    floor: LogLevel,
    dropped: u32,
}

impl<const N: usize> LogSink<N> {
    pub fn new(floor: LogLevel) -> Self {
        LogSink {
            records: core::array::from_fn(|_| None),
            next: 0,
            floor,
            dropped: 0,
        }
    }

    pub fn set_level(&mut self, floor: LogLevel) {
        self.floor = floor;
    }

    pub fn level(&self) -> LogLevel {
        self.floor
    }

    /// Records `message` if `level` is at or above the current floor.
    /// Below-floor records are counted in `dropped_count` but not stored.
    pub fn log(&mut self, task: Option<TaskId>, level: LogLevel, message: &'static str) {
        if level < self.floor {
            self.dropped += 1;
            return;
        }
        self.records[self.next] = Some(LogRecord {
            level,
            task,
            message,
        });
        self.next = (self.next + 1) % N;
    }

    pub fn dropped_count(&self) -> u32 {
        self.dropped
    }

    /// Iterates stored records oldest-first. Slots never written are
    /// skipped, so this is accurate even before the ring has wrapped once.
    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        (0..N)
            .map(move |i| &self.records[(self.next + i) % N])
            .filter_map(|slot| slot.as_ref())
    }
}

impl<const N: usize> Default for LogSink<N> {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_below_floor_are_dropped_not_stored() {
        let mut sink: LogSink<4> = LogSink::new(LogLevel::Warn);
        sink.log(None, LogLevel::Debug, "ignored");
        assert_eq!(sink.dropped_count(), 1);
        assert_eq!(sink.iter().count(), 0);
    }

    #[test]
    fn records_at_or_above_floor_are_kept_in_order() {
        let mut sink: LogSink<4> = LogSink::new(LogLevel::Debug);
        sink.log(Some(TaskId(1)), LogLevel::Info, "first");
        sink.log(Some(TaskId(2)), LogLevel::Error, "second");
        let messages: heapless::Vec<&str, 4> = sink.iter().map(|r| r.message).collect();
        assert_eq!(messages, ["first", "second"]);
    }

    #[test]
    fn ring_wraps_and_keeps_newest_n() {
        let mut sink: LogSink<2> = LogSink::new(LogLevel::Debug);
        sink.log(None, LogLevel::Info, "a");
        sink.log(None, LogLevel::Info, "b");
        sink.log(None, LogLevel::Info, "c");
        let messages: heapless::Vec<&str, 2> = sink.iter().map(|r| r.message).collect();
        assert_eq!(messages, ["b", "c"]);
    }
}
