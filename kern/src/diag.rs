//! Diagnostic surfaces that don't belong to any single subsystem: memory
//! telemetry and the persisted reset-info snapshot.

pub use abi::{ResetCause, ResetInfo};

/// Best-effort memory telemetry, sourced from whatever the platform can
/// report (see [`crate::platform::Platform`]'s heap/stack hooks). Fields
/// read `0` on platforms with no introspection.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoryInfo {
    pub free_heap_bytes: u32,
    pub largest_free_block: u32,
    pub stack_headroom: u32,
    /// Number of distinct free blocks the platform's allocator reports.
    pub free_fragment_count: u32,
    /// Derived estimate of fragmentation, 0..100: how much of the free
    /// heap is *not* contained in its single largest block. `0` when
    /// there's no free heap to fragment.
    pub fragmentation_percent: u32,
}

impl MemoryInfo {
    /// True if headroom has dropped to or below the configured canary
    /// margin, i.e. stack exhaustion looks imminent.
    pub fn stack_is_low(&self) -> bool {
        self.stack_headroom <= crate::config::STACK_CANARY_MARGIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_is_low_uses_configured_margin() {
        let ok = MemoryInfo {
            stack_headroom: crate::config::STACK_CANARY_MARGIN + 1,
            ..Default::default()
        };
        let low = MemoryInfo {
            stack_headroom: crate::config::STACK_CANARY_MARGIN,
            ..Default::default()
        };
        assert!(!ok.stack_is_low());
        assert!(low.stack_is_low());
    }

    #[test]
    fn fragmentation_percent_defaults_to_zero_with_no_heap_data() {
        let info = MemoryInfo::default();
        assert_eq!(info.fragmentation_percent, 0);
        assert_eq!(info.free_fragment_count, 0);
    }
}
