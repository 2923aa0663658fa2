//! Cooperative, non-blocking synchronization primitives.
//!
//! Neither primitive here ever blocks: there is no context to block *in*
//! under cooperative scheduling, since a task that can't make progress has
//! to return from `step` and let the scheduler run someone else. Both types
//! are plain state with no locking of their own; they're only ever
//! touched from the single cooperative execution context.

use abi::TaskId;

/// A lock owned by at most one task at a time, identified by task id.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Mutex {
    owner: Option<TaskId>,
}

impl Mutex {
    pub const fn new() -> Self {
        Mutex { owner: None }
    }

    /// Attempts to acquire the lock for `task`. Returns `true` only if the
    /// lock was unlocked and is now held by `task`; returns `false` if it
    /// was already held, even by `task` itself; this lock is not
    /// reentrant.
    pub fn try_lock(&mut self, task: TaskId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(task);
                true
            }
            Some(_) => false,
        }
    }

    /// Releases the lock if `task` currently holds it. No-op otherwise.
    pub fn unlock(&mut self, task: TaskId) -> bool {
        if self.owner == Some(task) {
            self.owner = None;
            true
        } else {
            false
        }
    }

    pub fn owner(&self) -> Option<TaskId> {
        self.owner
    }
}

/// A counting semaphore with a fixed maximum.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Semaphore {
    count: u8,
    max: u8,
    last_waiter: Option<TaskId>,
}

impl Semaphore {
    pub const fn new(initial: u8, max: u8) -> Self {
        Semaphore {
            count: if initial > max { max } else { initial },
            max,
            last_waiter: None,
        }
    }

    /// Attempts to take one unit. Returns `true` on success.
    pub fn wait(&mut self, task: TaskId) -> bool {
        if self.count > 0 {
            self.count -= 1;
            self.last_waiter = Some(task);
            true
        } else {
            false
        }
    }

    /// Returns one unit, up to `max`. Returns `true` if the count actually
    /// increased.
    pub fn signal(&mut self) -> bool {
        if self.count < self.max {
            self.count += 1;
            true
        } else {
            false
        }
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn last_waiter(&self) -> Option<TaskId> {
        self.last_waiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutex_try_lock_is_exclusive_and_not_reentrant() {
        let mut m = Mutex::new();
        assert!(m.try_lock(TaskId(1)));
        assert!(!m.try_lock(TaskId(2)));
        assert!(!m.try_lock(TaskId(1)));
    }

    #[test]
    fn mutex_unlock_only_by_owner() {
        let mut m = Mutex::new();
        m.try_lock(TaskId(1));
        assert!(!m.unlock(TaskId(2)));
        assert!(m.unlock(TaskId(1)));
        assert!(m.try_lock(TaskId(2)));
    }

    #[test]
    fn semaphore_respects_max_and_zero() {
        let mut s = Semaphore::new(1, 2);
        assert!(s.wait(TaskId(1)));
        assert!(!s.wait(TaskId(2)));
        assert!(s.signal());
        assert!(s.signal());
        assert!(!s.signal());
        assert_eq!(s.count(), 2);
    }
}
