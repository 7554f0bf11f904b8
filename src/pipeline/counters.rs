use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Cache-aligned pipeline counters and the stop flag.
///
/// Each field sits on its own cache line so producer, processor, and
/// strategy threads do not false-share while incrementing. The counters are
/// telemetry: increments and snapshot loads are relaxed, and the monitor
/// tolerates slightly stale values.
#[repr(align(64))]
pub struct PipelineCounters {
    produced: AtomicU64,
    _pad1: [u8; 56],

    processed: AtomicU64,
    _pad2: [u8; 56],

    delivered: AtomicU64,
    _pad3: [u8; 56],

    stop: AtomicBool,
    _pad4: [u8; 63],
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self {
            produced: AtomicU64::new(0),
            _pad1: [0; 56],
            processed: AtomicU64::new(0),
            _pad2: [0; 56],
            delivered: AtomicU64::new(0),
            _pad3: [0; 56],
            stop: AtomicBool::new(false),
            _pad4: [0; 63],
        }
    }

    /// Count one message accepted by a stage-1 ring.
    #[inline(always)]
    pub fn add_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one message forwarded into a stage-2 ring.
    #[inline(always)]
    pub fn add_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one message recorded by a strategy.
    #[inline(always)]
    pub fn add_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Worker-side stop check; relaxed is enough because a worker that
    /// misses one update observes the flag on its next yield cycle.
    #[inline(always)]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Controller-side stop signal. Release ordering publishes all ring
    /// state written before the shutdown decision.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Point-in-time counter snapshot for the monitor.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            produced: self.produced.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the three cumulative counters at one instant.
#[derive(Debug, Clone, Copy)]
pub struct CounterSnapshot {
    pub produced: u64,
    pub processed: u64,
    pub delivered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = PipelineCounters::new();
        let snap = counters.snapshot();
        assert_eq!(snap.produced, 0);
        assert_eq!(snap.processed, 0);
        assert_eq!(snap.delivered, 0);
        assert!(!counters.stop_requested());
    }

    #[test]
    fn test_increments_reach_snapshot() {
        let counters = PipelineCounters::new();
        counters.add_produced();
        counters.add_produced();
        counters.add_processed();
        counters.add_delivered();

        let snap = counters.snapshot();
        assert_eq!(snap.produced, 2);
        assert_eq!(snap.processed, 1);
        assert_eq!(snap.delivered, 1);
    }

    #[test]
    fn test_stop_flag() {
        let counters = PipelineCounters::new();
        assert!(!counters.stop_requested());
        counters.request_stop();
        assert!(counters.stop_requested());
    }

    #[test]
    fn test_concurrent_increments() {
        let counters = Arc::new(PipelineCounters::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let counters = Arc::clone(&counters);
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    counters.add_produced();
                }
            }));
        }

        for h in handles {
            h.join().expect("thread panicked");
        }
        assert_eq!(counters.snapshot().produced, 40_000);
    }
}
