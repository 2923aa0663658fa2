//! Error type returned by fallible core operations.
//!
//! The variants live in `abi` so application crates that only need to
//! match on error kinds don't have to depend on the rest of the scheduler.
//! This module re-exports them under a local path, the same way Hubris's
//! `kern::err` used to wrap `abi`'s fault types for its own callers.

pub use abi::SchedError;

pub type SchedResult<T> = Result<T, SchedError>;
