//! The scheduler: task registry, shared message queue, envelope pool, and
//! the cooperative dispatch loop that ties them together.

use crate::config;
use crate::diag::MemoryInfo;
use crate::envelope::{Envelope, EnvelopeHandle, DIRECT_TOPIC};
use crate::err::{SchedError, SchedResult};
use crate::logsink::LogSink;
use crate::platform::Platform;
use crate::pool::{EnvelopePool, PoolStats};
use crate::queue::BoundedQueue;
use crate::task::{Control, Task, TaskFlags, TaskSlot, TaskStats, TaskState};
use crate::time::Timestamp;
use abi::{LogLevel, Priority, ResetCause, ResetInfo, TaskId};

/// The resolved set of recipients for one queued envelope, computed once at
/// `post` time. Re-resolving at delivery time would let a subscribe or
/// unsubscribe that happens between post and delivery silently change who
/// gets the message and would make the reference count set at `alloc` time
/// incorrect; freezing the set at post time keeps both consistent.
#[derive(Copy, Clone, Debug)]
enum RecipientSet {
    Direct(TaskId),
    /// Bitmask over task registry slot indices (not task ids).
    Topic(u32),
}

#[derive(Copy, Clone, Debug)]
struct QueueItem {
    handle: EnvelopeHandle,
    recipients: RecipientSet,
}

/// Owns every piece of core state: the task registry, the shared queue, the
/// envelope pool, the log, and the platform handle. There is exactly one of
/// these per running system.
pub struct Scheduler<P: Platform> {
    platform: P,
    tasks: [Option<TaskSlot>; config::MAX_TASKS],
    next_id: u8,
    queue: BoundedQueue<QueueItem, { config::SHARED_QUEUE_CAPACITY }>,
    pool: EnvelopePool<{ config::MAX_MESSAGE_POOL_SIZE }>,
    log: LogSink<{ config::LOG_CAPACITY }>,
    watchdog_enabled: bool,
    last_task_run: TaskId,
    clock_ms: u32,
}

/// Implements [`Control`] for exactly the task currently being called into.
/// Holds the rest of the scheduler by mutable reference; the task's own
/// trait object has been taken out of its slot for the duration (see
/// [`Scheduler::with_task`]), so there's no aliasing between `self` here
/// and the `&mut dyn Task` the caller is also holding.
struct TaskCtx<'a, P: Platform> {
    sched: &'a mut Scheduler<P>,
    self_id: TaskId,
}

impl<'a, P: Platform> Control for TaskCtx<'a, P> {
    fn self_id(&self) -> TaskId {
        self.self_id
    }

    fn now_ms(&self) -> u32 {
        self.sched.clock_ms
    }

    fn suspend(&mut self) {
        self.sched.suspend(self.self_id);
    }

    fn resume(&mut self) {
        self.sched.resume(self.self_id);
    }

    fn terminate(&mut self) {
        self.sched.terminate(self.self_id);
    }

    fn set_period(&mut self, period_ms: u32) {
        self.sched.set_period(self.self_id, period_ms);
    }

    fn set_priority(&mut self, priority: Priority) {
        self.sched.set_priority(self.self_id, priority);
    }

    fn subscribe(&mut self, topic: u8) -> SchedResult<()> {
        self.sched.subscribe(self.self_id, topic)
    }

    fn unsubscribe(&mut self, topic: u8) -> SchedResult<()> {
        self.sched.unsubscribe(self.self_id, topic)
    }

    fn publish(&mut self, topic: u8, kind: u8, arg: u16) -> bool {
        self.sched.publish(self.self_id, topic, kind, arg)
    }

    fn tell(&mut self, dest: TaskId, kind: u8, arg: u16) -> bool {
        self.sched.tell(self.self_id, dest, kind, arg)
    }

    fn log(&mut self, level: LogLevel, message: &'static str) {
        self.sched.log(Some(self.self_id), level, message);
    }
}

impl<P: Platform> Scheduler<P> {
    pub fn new(platform: P) -> Self {
        Scheduler {
            platform,
            tasks: core::array::from_fn(|_| None),
            next_id: 1,
            queue: BoundedQueue::new(),
            pool: EnvelopePool::new(),
            log: LogSink::new(LogLevel::Info),
            watchdog_enabled: false,
            last_task_run: TaskId::NONE,
            clock_ms: 0,
        }
    }

    pub fn now_ms(&self) -> u32 {
        self.clock_ms
    }

    pub fn enable_watchdog(&mut self, timeout_code: u8) {
        self.platform.watchdog_enable(timeout_code);
        self.watchdog_enabled = true;
    }

    fn find_slot_index(&self, id: TaskId) -> Option<usize> {
        self.tasks
            .iter()
            .position(|s| matches!(s, Some(slot) if slot.id == id))
    }

    /// Takes the task's trait object out of its slot, builds a [`TaskCtx`]
    /// for the rest of `self`, calls `f`, then puts the trait object back.
    fn with_task<R>(
        &mut self,
        idx: usize,
        f: impl FnOnce(&mut dyn Task, &mut TaskCtx<'_, P>) -> R,
    ) -> R {
        let self_id = self.tasks[idx].as_ref().unwrap().id;
        let mut task = self.tasks[idx].as_mut().unwrap().task.take().unwrap();
        let result = {
            let mut ctx = TaskCtx {
                sched: &mut *self,
                self_id,
            };
            f(&mut *task, &mut ctx)
        };
        self.tasks[idx].as_mut().unwrap().task = Some(task);
        result
    }

    /// Allocates the next task id, wrapping past 254 back to 1 and skipping
    /// any id currently in use.
    fn alloc_id(&mut self) -> Option<TaskId> {
        for _ in 0..255u32 {
            let candidate = self.next_id;
            self.next_id = if self.next_id >= 254 { 1 } else { self.next_id + 1 };
            if self
                .tasks
                .iter()
                .flatten()
                .all(|slot| slot.id.0 != candidate)
            {
                return Some(TaskId(candidate));
            }
        }
        None
    }

    /// Registers a task, returning its id, or `TaskId::INVALID` if the
    /// registry is full.
    pub fn add(
        &mut self,
        task: &'static mut dyn Task,
        period_ms: u32,
        priority: Priority,
        flags: TaskFlags,
        name: Option<&'static str>,
    ) -> TaskId {
        let idx = match self.tasks.iter().position(|s| s.is_none()) {
            Some(i) => i,
            None => return TaskId::INVALID,
        };
        let id = match self.alloc_id() {
            Some(id) => id,
            None => return TaskId::INVALID,
        };
        self.tasks[idx] = Some(TaskSlot {
            id,
            state: TaskState::Active,
            priority,
            period_ms: period_ms.max(1),
            deadline_ms: self.clock_ms,
            subscriptions: 0,
            flags,
            name,
            stats: TaskStats::default(),
            pending: BoundedQueue::new(),
            task: Some(task),
        });
        self.with_task(idx, |t, ctx| t.on_start(ctx));
        id
    }

    /// Removes a task immediately: fires `on_stop` if it was `Active`,
    /// releases any envelopes still in its pending list, and frees the
    /// slot.
    pub fn remove(&mut self, id: TaskId) -> bool {
        let idx = match self.find_slot_index(id) {
            Some(i) => i,
            None => return false,
        };
        let was_active = matches!(self.tasks[idx].as_ref().unwrap().state, TaskState::Active);
        if was_active {
            self.with_task(idx, |t, ctx| t.on_stop(ctx));
        }
        while let Some(handle) = self.tasks[idx].as_mut().unwrap().pending.pop() {
            critical_section::with(|_| {
                self.pool.release(handle);
            });
        }
        self.tasks[idx] = None;
        true
    }

    pub fn suspend(&mut self, id: TaskId) -> bool {
        let idx = match self.find_slot_index(id) {
            Some(i) => i,
            None => return false,
        };
        if !matches!(self.tasks[idx].as_ref().unwrap().state, TaskState::Active) {
            return false;
        }
        self.tasks[idx].as_mut().unwrap().state = TaskState::Suspended;
        self.with_task(idx, |t, ctx| t.on_suspend(ctx));
        true
    }

    pub fn resume(&mut self, id: TaskId) -> bool {
        let idx = match self.find_slot_index(id) {
            Some(i) => i,
            None => return false,
        };
        if !matches!(self.tasks[idx].as_ref().unwrap().state, TaskState::Suspended) {
            return false;
        }
        let now = self.clock_ms;
        {
            let slot = self.tasks[idx].as_mut().unwrap();
            slot.state = TaskState::Active;
            slot.deadline_ms = now.wrapping_add(slot.period_ms);
        }
        self.with_task(idx, |t, ctx| t.on_resume(ctx));
        true
    }

    /// Marks a task `Terminated`. `on_stop` and the actual slot free are
    /// deferred to the sweep phase of the next `tick_once` (or the one in
    /// progress, if this is called from that task's own step).
    pub fn terminate(&mut self, id: TaskId) -> bool {
        let idx = match self.find_slot_index(id) {
            Some(i) => i,
            None => return false,
        };
        let slot = self.tasks[idx].as_mut().unwrap();
        if matches!(slot.state, TaskState::Terminated) {
            return false;
        }
        slot.state = TaskState::Terminated;
        true
    }

    pub fn set_period(&mut self, id: TaskId, period_ms: u32) -> bool {
        match self.find_slot_index(id) {
            Some(idx) => {
                self.tasks[idx].as_mut().unwrap().period_ms = period_ms.max(1);
                true
            }
            None => false,
        }
    }

    pub fn set_priority(&mut self, id: TaskId, priority: Priority) -> bool {
        match self.find_slot_index(id) {
            Some(idx) => {
                self.tasks[idx].as_mut().unwrap().priority = priority;
                true
            }
            None => false,
        }
    }

    pub fn subscribe(&mut self, id: TaskId, topic: u8) -> SchedResult<()> {
        if topic == DIRECT_TOPIC || topic as usize >= config::MAX_TOPICS {
            return Err(SchedError::SubscriptionOutOfRange);
        }
        let idx = self
            .find_slot_index(id)
            .ok_or(SchedError::InvalidIdentifier)?;
        self.tasks[idx].as_mut().unwrap().set_subscribed(topic, true);
        Ok(())
    }

    pub fn unsubscribe(&mut self, id: TaskId, topic: u8) -> SchedResult<()> {
        if topic == DIRECT_TOPIC || topic as usize >= config::MAX_TOPICS {
            return Err(SchedError::SubscriptionOutOfRange);
        }
        let idx = self
            .find_slot_index(id)
            .ok_or(SchedError::InvalidIdentifier)?;
        self.tasks[idx].as_mut().unwrap().set_subscribed(topic, false);
        Ok(())
    }

    fn resolve_recipients(&self, topic: u8, dest: Option<TaskId>) -> (RecipientSet, u16) {
        if topic == DIRECT_TOPIC {
            if let Some(d) = dest {
                if let Some(idx) = self.find_slot_index(d) {
                    if !matches!(self.tasks[idx].as_ref().unwrap().state, TaskState::Terminated) {
                        return (RecipientSet::Direct(d), 1);
                    }
                }
            }
            return (RecipientSet::Direct(dest.unwrap_or(TaskId::INVALID)), 0);
        }
        if topic as usize >= config::MAX_TOPICS {
            return (RecipientSet::Topic(0), 0);
        }
        let mut mask: u32 = 0;
        let mut count: u16 = 0;
        for (idx, slot) in self.tasks.iter().enumerate() {
            if let Some(s) = slot {
                if !matches!(s.state, TaskState::Terminated) && s.is_subscribed(topic) {
                    mask |= 1 << idx;
                    count += 1;
                }
            }
        }
        (RecipientSet::Topic(mask), count)
    }

    /// The primitive every send goes through. `dest` is only meaningful
    /// when `topic == 0` (a direct message); it's ignored otherwise.
    /// Returns `false` on `NoRecipients`, `QueueFull`, or `PoolExhausted`;
    /// callers that need to distinguish those should check conditions
    /// up front (e.g. `pool_stats`) rather than inspect the return value.
    pub fn post(
        &mut self,
        kind: u8,
        source: TaskId,
        topic: u8,
        dest: Option<TaskId>,
        arg: u16,
    ) -> bool {
        let (recipients, count) = self.resolve_recipients(topic, dest);
        if count == 0 {
            return false;
        }
        let handle = match critical_section::with(|_| self.pool.alloc(kind, source, topic, arg, count)) {
            Some(h) => h,
            None => return false,
        };
        let pushed = critical_section::with(|_| self.queue.push(QueueItem { handle, recipients }));
        if !pushed {
            critical_section::with(|_| {
                for _ in 0..count {
                    self.pool.release(handle);
                }
            });
            return false;
        }
        critical_section::with(|_| self.pool.adapt_soft_limit());
        true
    }

    pub fn publish(&mut self, from: TaskId, topic: u8, kind: u8, arg: u16) -> bool {
        self.post(kind, from, topic, None, arg)
    }

    pub fn tell(&mut self, from: TaskId, dest: TaskId, kind: u8, arg: u16) -> bool {
        self.post(kind, from, DIRECT_TOPIC, Some(dest), arg)
    }

    fn deliver_one(&mut self, idx: usize, handle: EnvelopeHandle) -> bool {
        match self.tasks[idx].as_mut() {
            Some(slot) if slot.accepts_messages() => slot.pending.push(handle),
            _ => false,
        }
    }

    fn deliver(&mut self) {
        loop {
            let item = match critical_section::with(|_| self.queue.pop()) {
                Some(i) => i,
                None => break,
            };
            match item.recipients {
                RecipientSet::Direct(dest) => {
                    let delivered = match self.find_slot_index(dest) {
                        Some(idx) => self.deliver_one(idx, item.handle),
                        None => false,
                    };
                    if !delivered {
                        critical_section::with(|_| {
                            self.pool.release(item.handle);
                        });
                    }
                }
                RecipientSet::Topic(mask) => {
                    for idx in 0..config::MAX_TASKS {
                        if mask & (1 << idx) == 0 {
                            continue;
                        }
                        if !self.deliver_one(idx, item.handle) {
                            critical_section::with(|_| {
                                self.pool.release(item.handle);
                            });
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&mut self) {
        let now = self.clock_ms;
        for idx in 0..config::MAX_TASKS {
            let due = match self.tasks[idx].as_ref() {
                Some(slot) => {
                    matches!(slot.state, TaskState::Active)
                        && Timestamp(now).has_reached(Timestamp(slot.deadline_ms))
                }
                None => false,
            };
            if !due {
                continue;
            }
            let budget = self.tasks[idx]
                .as_ref()
                .unwrap()
                .task
                .as_ref()
                .unwrap()
                .max_message_budget();
            if self.queue.free_slots() < budget as usize {
                // Leave the deadline as-is; this task is retried next tick.
                continue;
            }

            let start_us = self.platform.now_us();

            loop {
                let handle = match self.tasks[idx].as_mut().unwrap().pending.pop() {
                    Some(h) => h,
                    None => break,
                };
                if let Some(env) = self.pool.get(handle).copied() {
                    self.with_task(idx, |t, ctx| t.on_message(&env, ctx));
                }
                critical_section::with(|_| {
                    self.pool.release(handle);
                });
            }

            self.with_task(idx, |t, ctx| t.step(ctx));

            let exec_us = self.platform.now_us().wrapping_sub(start_us);
            if let Some(slot) = self.tasks[idx].as_mut() {
                slot.record_run(now, exec_us);
                self.last_task_run = slot.id;
                if matches!(slot.state, TaskState::Active) {
                    let mut new_deadline = slot.deadline_ms.wrapping_add(slot.period_ms);
                    if Timestamp(now).has_reached(Timestamp(new_deadline)) {
                        new_deadline = now.wrapping_add(slot.period_ms);
                    }
                    slot.deadline_ms = new_deadline;
                }
            }
        }
    }

    fn sweep(&mut self) {
        for idx in 0..config::MAX_TASKS {
            let terminated =
                matches!(self.tasks[idx].as_ref(), Some(slot) if matches!(slot.state, TaskState::Terminated));
            if !terminated {
                continue;
            }
            self.with_task(idx, |t, ctx| t.on_stop(ctx));
            while let Some(handle) = self.tasks[idx].as_mut().unwrap().pending.pop() {
                critical_section::with(|_| {
                    self.pool.release(handle);
                });
            }
            self.tasks[idx] = None;
        }
    }

    /// Runs one full scheduler step: clock refresh, delivery, dispatch,
    /// sweep, watchdog feed.
    pub fn tick_once(&mut self) {
        self.clock_ms = self.platform.now_ms();
        self.deliver();
        self.dispatch();
        self.sweep();
        if self.watchdog_enabled {
            self.platform.watchdog_feed();
        }
    }

    /// Runs `tick_once` forever. Never returns; the only way off this loop
    /// is a platform reset.
    pub fn run(&mut self) -> ! {
        loop {
            self.tick_once();
        }
    }

    pub fn task_stats(&self, id: TaskId) -> Option<TaskStats> {
        self.find_slot_index(id)
            .map(|idx| self.tasks[idx].as_ref().unwrap().stats)
    }

    /// Read-only view of a task's registry bookkeeping (state, priority,
    /// period, deadline, subscriptions, stats). Does not expose the task's
    /// own behavior object: that's borrowed out only for the duration of a
    /// callback invocation (see `with_task`), never handed to a caller.
    pub fn get_task(&self, id: TaskId) -> Option<&TaskSlot> {
        self.find_slot_index(id).map(|idx| self.tasks[idx].as_ref().unwrap())
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// The task with the largest recorded `max_delay_ms`, if any task has
    /// ever been delayed. Ties break toward the lowest registry slot:
    /// `max_by_key` would return the *last* of equal maxima, so the fold
    /// below keeps the first one instead.
    pub fn most_delaying_task(&self) -> Option<TaskId> {
        self.tasks
            .iter()
            .flatten()
            .filter(|s| s.stats.max_delay_ms > 0)
            .fold(None, |best: Option<&TaskSlot>, s| match best {
                Some(b) if b.stats.max_delay_ms >= s.stats.max_delay_ms => Some(b),
                _ => Some(s),
            })
            .map(|s| s.id)
    }

    pub fn last_task_run(&self) -> TaskId {
        self.last_task_run
    }

    pub fn reset_info(&self) -> ResetInfo {
        let raw = self.platform.reset_cause_raw();
        let last = self.platform.take_last_task_preserved();
        ResetInfo {
            last_task_id: TaskId(last),
            cause: ResetCause::from_raw(raw),
        }
    }

    pub fn system_memory_info(&self) -> MemoryInfo {
        let free_heap_bytes = self.platform.free_heap_bytes();
        let largest_free_block = self.platform.largest_free_block();
        let fragmentation_percent = if free_heap_bytes == 0 {
            0
        } else {
            100 - (largest_free_block.min(free_heap_bytes) * 100 / free_heap_bytes)
        };
        MemoryInfo {
            free_heap_bytes,
            largest_free_block,
            stack_headroom: self.platform.stack_headroom(),
            free_fragment_count: self.platform.free_fragment_count(),
            fragmentation_percent,
        }
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        self.log.set_level(level);
    }

    pub fn log(&mut self, task: Option<TaskId>, level: LogLevel, message: &'static str) {
        critical_section::with(|_| {
            self.log.log(task, level, message);
        });
    }

    pub fn log_sink(&self) -> &LogSink<{ config::LOG_CAPACITY }> {
        &self.log
    }
}
