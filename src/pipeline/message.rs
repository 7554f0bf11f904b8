use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::pipeline::routing::TYPE_MAX;

/// Fixed-layout message carried through both pipeline stages.
///
/// The struct is plain data so it crosses the rings by value with no
/// allocation or serialization on the hot path. Fields are ordered
/// largest-first and the tail padding is explicit, which keeps the layout
/// free of compiler-inserted padding and makes the 32-byte size testable.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes, FromZeroes)]
pub struct Message {
    /// Monotonic clock value at the moment of production.
    pub timestamp_ns: u64,

    /// Monotonic clock value at stage-1 exit. Zero until a processor
    /// stamps it; a strategy observing zero is a programming error.
    pub processed_ns: u64,

    /// Per-producer counter starting at 0. It advances with every message
    /// the producer builds, so gaps mark push-side drops under
    /// back-pressure.
    pub sequence: u32,

    /// Routing key for both stages, in `[0, TYPE_MAX]`.
    pub msg_type: u8,

    /// Originating producer index.
    pub producer_id: u8,

    /// Stamped by the processor at stage-1 exit.
    pub processor_id: u8,

    /// Explicit tail padding to 32 bytes.
    _pad: [u8; 9],
}

impl Message {
    /// Build a freshly produced message. Stage-1 exit fields start zeroed.
    #[inline(always)]
    pub fn new(msg_type: u8, producer_id: u8, sequence: u32, timestamp_ns: u64) -> Self {
        debug_assert!(msg_type <= TYPE_MAX);
        Self {
            timestamp_ns,
            processed_ns: 0,
            sequence,
            msg_type,
            producer_id,
            processor_id: 0,
            _pad: [0; 9],
        }
    }
}
