//! Message envelopes: the reference-counted records that flow through the
//! shared queue and every task's pending list.

use abi::TaskId;

/// Topic number reserved for direct (addressed) messages.
pub const DIRECT_TOPIC: u8 = 0;

/// The payload of a message, stored once in the pool and shared by
/// reference across every recipient.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub kind: u8,
    pub source: TaskId,
    pub topic: u8,
    pub arg: u16,
}

impl Envelope {
    pub fn is_direct(&self) -> bool {
        self.topic == DIRECT_TOPIC
    }
}

/// A handle to an envelope living in the [`crate::pool::EnvelopePool`].
///
/// Opaque on purpose: the only legal operations on a live envelope are "read
/// its fields" (via the pool) and "release this reference" (also via the
/// pool, which is the only thing that knows the reference count).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct EnvelopeHandle(pub(crate) u8);
