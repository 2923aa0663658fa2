//! The task behavioral contract and the bookkeeping the scheduler keeps
//! about each registered task.

use crate::config::TASK_PENDING_CAPACITY;
use crate::envelope::{Envelope, EnvelopeHandle};
use crate::err::SchedResult;
use crate::queue::BoundedQueue;
use abi::{LogLevel, Priority, TaskId};

bitflags::bitflags! {
    /// Boolean behavior switches set when a task is added.
    #[derive(Default)]
    pub struct TaskFlags: u8 {
        /// While `Suspended`, keep accepting messages onto the pending
        /// list instead of dropping them.
        const QUEUE_WHILE_SUSPENDED = 1 << 0;
    }
}

/// Lifecycle state of a registered task. Only `Active` tasks are dispatched.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskState {
    Active,
    Suspended,
    Terminated,
}

/// Execution profiling accumulated by the scheduler, never mutated by the
/// task itself.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TaskStats {
    pub run_count: u32,
    pub max_exec_us: u32,
    pub avg_exec_us: u32,
    pub delay_count: u32,
    pub max_delay_ms: u32,
    pub last_deadline_ms: u32,
    pub last_start_ms: u32,
}

impl TaskStats {
    fn record_run(&mut self, deadline_ms: u32, start_ms: u32, exec_us: u32) {
        self.run_count += 1;
        self.last_deadline_ms = deadline_ms;
        self.last_start_ms = start_ms;
        if exec_us > self.max_exec_us {
            self.max_exec_us = exec_us;
        }
        // Exponential moving average, new sample weighted 1/8th.
        self.avg_exec_us = ((self.avg_exec_us as u64 * 7 + exec_us as u64) / 8) as u32;
        let delay_ms = start_ms.wrapping_sub(deadline_ms);
        if (delay_ms as i32) > 0 {
            self.delay_count += 1;
            if delay_ms > self.max_delay_ms {
                self.max_delay_ms = delay_ms;
            }
        }
    }
}

/// The scheduler operations a task may invoke on itself from within one of
/// its own callbacks. Passed in by reference rather than made reachable
/// through a global, so a task can't reach into another task's state.
pub trait Control {
    fn self_id(&self) -> TaskId;
    fn now_ms(&self) -> u32;
    fn suspend(&mut self);
    fn resume(&mut self);
    fn terminate(&mut self);
    fn set_period(&mut self, period_ms: u32);
    fn set_priority(&mut self, priority: Priority);
    fn subscribe(&mut self, topic: u8) -> SchedResult<()>;
    fn unsubscribe(&mut self, topic: u8) -> SchedResult<()>;
    fn publish(&mut self, topic: u8, kind: u8, arg: u16) -> bool;
    fn tell(&mut self, dest: TaskId, kind: u8, arg: u16) -> bool;
    fn log(&mut self, level: LogLevel, message: &'static str);
}

/// Behavior a task must implement. `step` is the only required method;
/// everything else has a no-op default.
pub trait Task {
    /// Called once per period. Must run to completion: there is no
    /// mechanism for a step to yield partway through.
    fn step(&mut self, ctx: &mut dyn Control);

    fn on_start(&mut self, _ctx: &mut dyn Control) {}
    fn on_stop(&mut self, _ctx: &mut dyn Control) {}
    fn on_suspend(&mut self, _ctx: &mut dyn Control) {}
    fn on_resume(&mut self, _ctx: &mut dyn Control) {}
    fn on_message(&mut self, _msg: &Envelope, _ctx: &mut dyn Control) {}

    /// Messages this task may post during one step. The scheduler checks
    /// the shared queue has at least this many free slots before letting
    /// the task run, so a step that honors its own budget never has a
    /// `post` call fail due to its own backpressure.
    fn max_message_budget(&self) -> u8 {
        1
    }

    /// Size hint reported in memory diagnostics; purely informational.
    fn struct_size(&self) -> u16 {
        0
    }
}

/// Registry bookkeeping for one live task. Owned by the scheduler; the
/// trait object itself is borrowed from the application for `'static`.
pub struct TaskSlot {
    pub id: TaskId,
    pub state: TaskState,
    pub priority: Priority,
    pub period_ms: u32,
    pub deadline_ms: u32,
    pub subscriptions: u32,
    pub flags: TaskFlags,
    pub name: Option<&'static str>,
    pub stats: TaskStats,
    pub pending: BoundedQueue<EnvelopeHandle, TASK_PENDING_CAPACITY>,
    /// Always `Some` except for the brief window during dispatch where the
    /// scheduler has taken it out to call into it without aliasing `self`.
    pub task: Option<&'static mut dyn Task>,
}

impl TaskSlot {
    pub fn is_subscribed(&self, topic: u8) -> bool {
        topic != 0 && (topic as usize) < 32 && self.subscriptions & (1 << topic) != 0
    }

    pub fn set_subscribed(&mut self, topic: u8, on: bool) {
        if topic == 0 || (topic as usize) >= 32 {
            return;
        }
        if on {
            self.subscriptions |= 1 << topic;
        } else {
            self.subscriptions &= !(1 << topic);
        }
    }

    pub fn accepts_messages(&self) -> bool {
        match self.state {
            TaskState::Active => true,
            TaskState::Suspended => self.flags.contains(TaskFlags::QUEUE_WHILE_SUSPENDED),
            TaskState::Terminated => false,
        }
    }

    pub fn record_run(&mut self, start_ms: u32, exec_us: u32) {
        let deadline = self.deadline_ms;
        self.stats.record_run(deadline, start_ms, exec_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl Task for Noop {
        fn step(&mut self, _ctx: &mut dyn Control) {}
    }

    fn slot_with_state(state: TaskState, task: &'static mut dyn Task) -> TaskSlot {
        TaskSlot {
            id: TaskId(1),
            state,
            priority: Priority::NORMAL,
            period_ms: 100,
            deadline_ms: 0,
            subscriptions: 0,
            flags: TaskFlags::empty(),
            name: None,
            stats: TaskStats::default(),
            pending: BoundedQueue::new(),
            task: Some(task),
        }
    }

    #[test]
    fn subscription_bitfield_round_trips() {
        static mut T: Noop = Noop;
        let task: &'static mut dyn Task = unsafe { &mut T };
        let mut slot = slot_with_state(TaskState::Active, task);
        assert!(!slot.is_subscribed(3));
        slot.set_subscribed(3, true);
        assert!(slot.is_subscribed(3));
        slot.set_subscribed(3, false);
        assert!(!slot.is_subscribed(3));
    }

    #[test]
    fn topic_zero_is_never_subscribed() {
        static mut T: Noop = Noop;
        let task: &'static mut dyn Task = unsafe { &mut T };
        let mut slot = slot_with_state(TaskState::Active, task);
        slot.set_subscribed(0, true);
        assert!(!slot.is_subscribed(0));
    }

    #[test]
    fn suspended_without_flag_does_not_accept_messages() {
        static mut T: Noop = Noop;
        let task: &'static mut dyn Task = unsafe { &mut T };
        let slot = slot_with_state(TaskState::Suspended, task);
        assert!(!slot.accepts_messages());
    }
}
