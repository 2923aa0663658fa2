//! Compile-time sizing for every fixed-capacity structure in the core.
//!
//! Everything here is a plain `const`, not a runtime-configured field: the
//! core never sizes an allocation at startup, it only ever indexes into
//! arrays whose size was baked in at compile time. Tune these per
//! application by editing this file (or, if that becomes painful, lifting
//! them to Cargo features; not done here since a single firmware image
//! only ever wants one set of these).

/// Maximum number of live tasks in the registry.
///
/// Chosen to fit in a `u32` subscription bitmask index space; the topic
/// subscription scanning in `sched.rs` assumes `MAX_TASKS <= 32`.
pub const MAX_TASKS: usize = 32;

/// Width of the per-task subscription bitfield, i.e. `1..MAX_TOPICS` are
/// valid topic numbers (0 is reserved for direct messages). One of 8, 16,
/// or 32, matching the width of the `u32` bitfield word that backs it.
pub const MAX_TOPICS: usize = 32;

/// Number of envelopes the pool can hold at once, at its hard cap.
pub const MAX_MESSAGE_POOL_SIZE: usize = 16;

/// Capacity of the shared, interrupt-safe message queue.
pub const SHARED_QUEUE_CAPACITY: usize = 32;

/// Capacity of each task's own pending-message list.
pub const TASK_PENDING_CAPACITY: usize = 8;

/// Period assigned to a task that doesn't specify one.
pub const DEFAULT_TASK_PERIOD_MS: u32 = 100;

/// Default declared per-step message budget.
pub const DEFAULT_TASK_MESSAGE_BUDGET: u8 = 1;

/// Headroom, in bytes, the stack usage estimator treats as "healthy".
pub const STACK_CANARY_MARGIN: u32 = 64;

/// Capacity of the in-RAM diagnostic log ring.
pub const LOG_CAPACITY: usize = 32;
