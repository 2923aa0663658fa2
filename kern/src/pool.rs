//! Fixed-capacity pool of reference-counted message envelopes.
//!
//! Envelopes never move once allocated: a slot's reference count is set
//! once, at `alloc`, to the number of recipients the scheduler resolved at
//! post time, and decremented by one every time a recipient finishes
//! consuming its reference. The slot returns to the free list the instant
//! its count reaches zero. There is no general heap behind this: `N` is a
//! compile-time constant and the whole pool is one array.

use crate::envelope::{Envelope, EnvelopeHandle};
use abi::TaskId;
use heapless::Vec;

struct Slot {
    envelope: Envelope,
    refcount: u16,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    pub capacity: usize,
    pub in_use: usize,
    pub peak: usize,
    pub soft_limit: usize,
}

pub struct EnvelopePool<const N: usize> {
    slots: [Option<Slot>; N],
    free: Vec<u8, N>,
    soft_limit: usize,
    peak: usize,
}

impl<const N: usize> EnvelopePool<N> {
    pub fn new() -> Self {
        let mut free = Vec::new();
        // Push in descending order so popping hands out slot 0 first; purely
        // cosmetic (helps keep low-numbered handles in tests readable).
        for i in (0..N).rev() {
            let _ = free.push(i as u8);
        }
        EnvelopePool {
            slots: core::array::from_fn(|_| None),
            free,
            soft_limit: Self::initial_soft_limit(),
            peak: 0,
        }
    }

    /// Starts one below the hard cap so `adapt_soft_limit` has somewhere to
    /// go; a pool of capacity 0 or 1 has no room to start below its cap.
    fn initial_soft_limit() -> usize {
        if N > 1 {
            N - 1
        } else {
            N
        }
    }

    /// Allocates a new envelope with the given reference count. Returns
    /// `None` (pool exhausted) if no slot is free or the soft limit has
    /// been reached.
    pub fn alloc(
        &mut self,
        kind: u8,
        source: TaskId,
        topic: u8,
        arg: u16,
        refcount: u16,
    ) -> Option<EnvelopeHandle> {
        if self.in_use() >= self.soft_limit {
            return None;
        }
        let idx = self.free.pop()?;
        self.slots[idx as usize] = Some(Slot {
            envelope: Envelope {
                kind,
                source,
                topic,
                arg,
            },
            refcount,
        });
        let in_use = self.in_use();
        if in_use > self.peak {
            self.peak = in_use;
        }
        Some(EnvelopeHandle(idx))
    }

    pub fn get(&self, handle: EnvelopeHandle) -> Option<&Envelope> {
        self.slots[handle.0 as usize].as_ref().map(|s| &s.envelope)
    }

    /// Decrements the reference count for `handle` by one, freeing the slot
    /// back to the pool once it reaches zero. Returns `true` if the slot
    /// was freed by this call.
    pub fn release(&mut self, handle: EnvelopeHandle) -> bool {
        let idx = handle.0 as usize;
        let freed = match self.slots[idx].as_mut() {
            Some(slot) => {
                debug_assert!(slot.refcount > 0, "double-release of envelope");
                slot.refcount = slot.refcount.saturating_sub(1);
                slot.refcount == 0
            }
            None => return false,
        };
        if freed {
            self.slots[idx] = None;
            let _ = self.free.push(idx as u8);
        }
        freed
    }

    pub fn in_use(&self) -> usize {
        N - self.free.len()
    }

    /// Raises the soft limit one step toward the hard cap `N` once
    /// utilization reaches three quarters of the current soft limit.
    /// Starts below `N` (see `initial_soft_limit`) so this has actual
    /// effect; never lowers it below the value it started at.
    pub fn adapt_soft_limit(&mut self) {
        if self.in_use() * 4 >= self.soft_limit * 3 && self.soft_limit < N {
            self.soft_limit += 1;
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: N,
            in_use: self.in_use(),
            peak: self.peak,
            soft_limit: self.soft_limit,
        }
    }
}

impl<const N: usize> Default for EnvelopePool<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src() -> TaskId {
        TaskId(1)
    }

    #[test]
    fn alloc_and_release_round_trip() {
        let mut pool: EnvelopePool<4> = EnvelopePool::new();
        let h = pool.alloc(1, src(), 0, 0, 1).unwrap();
        assert_eq!(pool.in_use(), 1);
        assert!(pool.release(h));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn refcount_must_reach_zero_before_slot_is_freed() {
        let mut pool: EnvelopePool<4> = EnvelopePool::new();
        let h = pool.alloc(1, src(), 3, 0, 2).unwrap();
        assert!(!pool.release(h));
        assert_eq!(pool.in_use(), 1);
        assert!(pool.release(h));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn exhaustion_returns_none_and_leaves_in_use_unchanged() {
        let mut pool: EnvelopePool<2> = EnvelopePool::new();
        let _a = pool.alloc(1, src(), 0, 0, 1).unwrap();
        pool.adapt_soft_limit(); // raises the soft limit up to the hard cap
        let _b = pool.alloc(1, src(), 0, 0, 1).unwrap();
        let before = pool.in_use();
        assert!(pool.alloc(1, src(), 0, 0, 1).is_none());
        assert_eq!(pool.in_use(), before);
    }

    #[test]
    fn adapt_soft_limit_raises_toward_hard_cap_under_pressure() {
        let mut pool: EnvelopePool<4> = EnvelopePool::new();
        assert_eq!(pool.stats().soft_limit, 3);

        let _a = pool.alloc(1, src(), 0, 0, 1).unwrap();
        let _b = pool.alloc(1, src(), 0, 0, 1).unwrap();
        pool.adapt_soft_limit();
        assert_eq!(pool.stats().soft_limit, 3); // 2 of 3: not yet under pressure

        let _c = pool.alloc(1, src(), 0, 0, 1).unwrap();
        pool.adapt_soft_limit();
        assert_eq!(pool.stats().soft_limit, 4); // 3 of 3: raised to the hard cap

        pool.adapt_soft_limit();
        assert_eq!(pool.stats().soft_limit, 4); // stays put once it hits N
    }

    #[test]
    fn get_reflects_fields_set_at_alloc() {
        let mut pool: EnvelopePool<2> = EnvelopePool::new();
        let h = pool.alloc(9, TaskId(3), 5, 42, 1).unwrap();
        let env = pool.get(h).unwrap();
        assert_eq!(env.kind, 9);
        assert_eq!(env.source, TaskId(3));
        assert_eq!(env.topic, 5);
        assert_eq!(env.arg, 42);
    }
}
