use std::time::Instant;

use once_cell::sync::Lazy;

/// Process-wide monotonic anchor; every timestamp is an offset from it.
static ANCHOR: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic nanoseconds since the first clock use in this process.
///
/// Non-blocking and safe from any thread; all latency arithmetic in the
/// pipeline subtracts two of these values.
#[inline(always)]
pub fn now_ns() -> u64 {
    ANCHOR.elapsed().as_nanos() as u64
}

/// Force the anchor so the first hot-path read does not pay the lazy-init
/// cost. The controller calls this before spawning workers.
pub fn warm() {
    Lazy::force(&ANCHOR);
}
