//! Pipeline lifecycle: construct, start, monitor, stop, join, summarize.
//!
//! The controller owns every shared entity (rings, counters, sink) for the
//! whole run; workers hold cloned handles, and all of them are joined
//! before the summary reads the sink. The state machine is Configured ->
//! Running -> Stopping -> Joined -> Summarized with no reversible edge,
//! which `run` expresses by consuming the pipeline.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::pipeline::clock;
use crate::pipeline::counters::PipelineCounters;
use crate::pipeline::latency::{LatencyReport, LatencySink, PercentileRow};
use crate::pipeline::message::Message;
use crate::pipeline::pinning::{spawn_worker, CorePlan};
use crate::pipeline::ring::SpscRing;
use crate::pipeline::routing::RoutingTable;
use crate::pipeline::workers::{self, ProcessorCtx, ProducerCtx, StrategyCtx};
use crate::DynError;

/// Per-second monitor snapshot: counter deltas in millions plus the
/// approximate depth of every ring at snapshot time.
#[derive(Debug, Clone)]
pub struct IntervalStats {
    /// 1-based second index within the run.
    pub second: u64,
    pub produced_m: f64,
    pub processed_m: f64,
    pub delivered_m: f64,
    /// Flow-balance indicator: change in `produced - delivered` over the
    /// interval. Positive means backlog grew, negative means it drained.
    /// Not a cumulative drop count.
    pub lost_m: f64,
    pub stage1_depths: Vec<usize>,
    pub stage2_depths: Vec<usize>,
}

impl IntervalStats {
    /// Render the monitor line the driver logs once per second.
    pub fn format_line(&self) -> String {
        format!(
            "[{:.2}s] Produced: {}M | Processed: {}M | Delivered: {}M | Lost: {}M | Stage1 Queues: {:?} | Stage2 Queues: {:?}",
            self.second as f64,
            self.produced_m,
            self.processed_m,
            self.delivered_m,
            self.lost_m,
            self.stage1_depths,
            self.stage2_depths,
        )
    }
}

/// Final report: cumulative counters, per-shard traffic, and percentiles.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub duration_secs: u64,
    pub produced: u64,
    pub processed: u64,
    pub delivered: u64,
    /// Accepted pushes per producer, in spawn order.
    pub produced_per_producer: Vec<u64>,
    /// Forwarded messages per processor, in spawn order.
    pub processed_per_processor: Vec<u64>,
    /// Recorded messages per strategy, in spawn order.
    pub delivered_per_strategy: Vec<u64>,
    pub latency: LatencyReport,
}

impl PipelineReport {
    /// Render the summary block written to `<scenario>_summary.txt`.
    pub fn format_summary(&self, scenario: &str) -> String {
        fn row(label: &str, row: &PercentileRow) -> String {
            format!(
                "{:<9}{:>8.2}{:>8.2}{:>8.2}\n",
                label, row.p50, row.p90, row.p99,
            )
        }

        let mut out = String::new();
        out.push_str("=== PERFORMANCE SUMMARY ===\n");
        out.push_str(&format!("Scenario: {scenario}\n"));
        out.push_str(&format!("Duration: {} seconds\n", self.duration_secs));
        out.push_str(&format!("Produced:  {}\n", self.produced));
        out.push_str(&format!("Processed: {}\n", self.processed));
        out.push_str(&format!("Delivered: {}\n", self.delivered));
        out.push_str("\nLatency Percentiles (us):\n");
        out.push_str(&format!("{:<9}{:>8}{:>8}{:>8}\n", "Stage", "p50", "p90", "p99"));
        out.push_str(&row("Stage1", &self.latency.stage1));
        out.push_str(&row("Process", &self.latency.processing));
        out.push_str(&row("Stage2", &self.latency.stage2));
        out.push_str(&row("Total", &self.latency.total));
        out
    }
}

/// The assembled dispatch fabric, ready to run once.
pub struct Pipeline {
    duration_secs: u64,
    producer_count: usize,
    pin_threads: bool,
    stage1: Vec<Arc<SpscRing<Message>>>,
    stage2: Vec<Arc<SpscRing<Message>>>,
    stage1_routes: Arc<RoutingTable>,
    stage2_routes: Arc<RoutingTable>,
    counters: Arc<PipelineCounters>,
    sink: Arc<LatencySink>,
}

impl Pipeline {
    /// Validate the configuration and allocate every shared entity.
    ///
    /// All construction happens before any worker is spawned; a rejected
    /// configuration is fatal before the pipeline ever runs.
    pub fn new(cfg: &Config) -> Result<Self, DynError> {
        cfg.validate()?;

        let stage1 = (0..cfg.processors.count)
            .map(|_| SpscRing::with_capacity(cfg.queue_capacity))
            .collect();
        let stage2 = (0..cfg.strategies.count)
            .map(|_| SpscRing::with_capacity(cfg.queue_capacity))
            .collect();

        Ok(Self {
            duration_secs: cfg.duration_secs,
            producer_count: cfg.producers.count,
            pin_threads: cfg.pin_threads,
            stage1,
            stage2,
            stage1_routes: Arc::new(cfg.stage1_table()),
            stage2_routes: Arc::new(cfg.stage2_table()),
            counters: Arc::new(PipelineCounters::new()),
            sink: Arc::new(LatencySink::new()),
        })
    }

    /// Run the full lifecycle and return the final report.
    ///
    /// `on_interval` fires once per monitored second with that interval's
    /// deltas and ring depths.
    pub fn run<F>(self, mut on_interval: F) -> PipelineReport
    where
        F: FnMut(&IntervalStats),
    {
        clock::warm();

        let worker_count = self.producer_count + self.stage1.len() + self.stage2.len();
        let mut plan = CorePlan::new(self.pin_threads, worker_count);

        // Spawn leaves first (strategies, processors, producers) so every
        // ring has its consumer in place before traffic arrives.
        let mut strategies = Vec::with_capacity(self.stage2.len());
        for (sid, ring) in self.stage2.iter().enumerate() {
            let ctx = StrategyCtx {
                stage2: ring.consumer(),
                sink: Arc::clone(&self.sink),
                counters: Arc::clone(&self.counters),
            };
            strategies.push(spawn_worker(
                &format!("strategy-{sid}"),
                plan.next_core(),
                move || workers::run_strategy(ctx),
            ));
        }

        let mut processors = Vec::with_capacity(self.stage1.len());
        for (pid, ring) in self.stage1.iter().enumerate() {
            let ctx = ProcessorCtx {
                processor_id: pid as u8,
                stage1: ring.consumer(),
                stage2: self.stage2.iter().map(|r| r.producer()).collect(),
                routes: Arc::clone(&self.stage2_routes),
                counters: Arc::clone(&self.counters),
            };
            processors.push(spawn_worker(
                &format!("processor-{pid}"),
                plan.next_core(),
                move || workers::run_processor(ctx),
            ));
        }

        let mut producers = Vec::with_capacity(self.producer_count);
        for pid in 0..self.producer_count {
            let ctx = ProducerCtx {
                producer_id: pid as u8,
                stage1: self.stage1.iter().map(|r| r.producer()).collect(),
                routes: Arc::clone(&self.stage1_routes),
                counters: Arc::clone(&self.counters),
            };
            producers.push(spawn_worker(
                &format!("producer-{pid}"),
                plan.next_core(),
                move || workers::run_producer(ctx),
            ));
        }

        // Monitor: one snapshot per second of the configured duration.
        let mut prev = self.counters.snapshot();
        for second in 1..=self.duration_secs {
            thread::sleep(Duration::from_secs(1));
            let snap = self.counters.snapshot();

            // Relaxed counters can read one increment apart mid-flight, so
            // the backlog arithmetic stays signed.
            let backlog_now = snap.produced as i64 - snap.delivered as i64;
            let backlog_prev = prev.produced as i64 - prev.delivered as i64;

            let stats = IntervalStats {
                second,
                produced_m: (snap.produced - prev.produced) as f64 / 1e6,
                processed_m: (snap.processed - prev.processed) as f64 / 1e6,
                delivered_m: (snap.delivered - prev.delivered) as f64 / 1e6,
                lost_m: (backlog_now - backlog_prev) as f64 / 1e6,
                stage1_depths: self.stage1.iter().map(|r| r.len()).collect(),
                stage2_depths: self.stage2.iter().map(|r| r.len()).collect(),
            };
            on_interval(&stats);
            prev = snap;
        }

        // Stop and join roots first, so upstream stops feeding before
        // downstream gives up on draining.
        self.counters.request_stop();

        let produced_per_producer = producers
            .into_iter()
            .map(|h| h.join().expect("producer thread panicked"))
            .collect();
        let processed_per_processor = processors
            .into_iter()
            .map(|h| h.join().expect("processor thread panicked"))
            .collect();
        let delivered_per_strategy = strategies
            .into_iter()
            .map(|h| h.join().expect("strategy thread panicked"))
            .collect();

        let snap = self.counters.snapshot();
        PipelineReport {
            duration_secs: self.duration_secs,
            produced: snap.produced,
            processed: snap.processed,
            delivered: snap.delivered,
            produced_per_producer,
            processed_per_processor,
            delivered_per_strategy,
            latency: self.sink.summarize(),
        }
    }
}
