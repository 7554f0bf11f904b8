//! Role loops: producer, processor, and strategy bodies run one per thread.
//!
//! Every loop is non-blocking on the rings and cooperates on the shared
//! stop flag; a worker that is yielding on a full or empty ring observes
//! stop within one yield cycle. Each loop returns its local count so the
//! controller can report per-shard traffic next to the global counters.

use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::pipeline::clock;
use crate::pipeline::counters::PipelineCounters;
use crate::pipeline::latency::LatencySink;
use crate::pipeline::message::Message;
use crate::pipeline::ring::{RingConsumer, RingProducer};
use crate::pipeline::routing::RoutingTable;

/// Producers draw types uniformly from the low half of the routing table.
const PRODUCED_TYPES: u8 = 4;

pub struct ProducerCtx {
    pub producer_id: u8,
    /// Push handle for every stage-1 ring; the routing table picks one.
    pub stage1: Vec<RingProducer<Message>>,
    pub routes: Arc<RoutingTable>,
    pub counters: Arc<PipelineCounters>,
}

/// Generate and push messages until stop.
///
/// The PRNG is seeded with `producer_id + 1` so every run of a scenario
/// draws the same type stream. The sequence counter advances with each
/// built message whether or not the push lands: a full ring abandons the
/// in-hand message after a yield, so downstream observers can detect
/// push-side drops as sequence gaps. `produced` counts accepted pushes
/// only.
pub fn run_producer(ctx: ProducerCtx) -> u64 {
    let mut rng = StdRng::seed_from_u64(ctx.producer_id as u64 + 1);
    let mut sequence: u32 = 0;
    let mut produced: u64 = 0;

    while !ctx.counters.stop_requested() {
        let msg_type: u8 = rng.gen_range(0..PRODUCED_TYPES);
        let msg = Message::new(msg_type, ctx.producer_id, sequence, clock::now_ns());
        sequence = sequence.wrapping_add(1);

        let dest = ctx.routes.route(msg_type);
        match ctx.stage1[dest].try_push(msg) {
            Ok(()) => {
                ctx.counters.add_produced();
                produced += 1;
            }
            // Back-pressure: give the consumer the CPU and move on.
            Err(_) => thread::yield_now(),
        }
    }

    produced
}

pub struct ProcessorCtx {
    pub processor_id: u8,
    /// Consumer end of this processor's own stage-1 ring.
    pub stage1: RingConsumer<Message>,
    /// Push handle for every stage-2 ring; the routing table picks one.
    pub stage2: Vec<RingProducer<Message>>,
    pub routes: Arc<RoutingTable>,
    pub counters: Arc<PipelineCounters>,
}

/// Drain stage-1, stamp the header, forward into stage-2.
///
/// The stage-1 latency rides inside the message (`processed_ns -
/// timestamp_ns`), so the strategy computes it without cross-thread
/// coordination. A stop that lands while this loop is retrying a full
/// stage-2 ring drops the in-hand message: it was counted `produced` but
/// never `processed`, the one intentional accounting leak that bounds
/// shutdown latency.
pub fn run_processor(ctx: ProcessorCtx) -> u64 {
    let mut processed: u64 = 0;

    while !ctx.counters.stop_requested() {
        let mut msg = match ctx.stage1.try_pop() {
            Some(msg) => msg,
            None => {
                thread::yield_now();
                continue;
            }
        };

        msg.processor_id = ctx.processor_id;
        msg.processed_ns = clock::now_ns();

        let dest = ctx.routes.route(msg.msg_type);
        let mut pending = msg;
        loop {
            match ctx.stage2[dest].try_push(pending) {
                Ok(()) => {
                    ctx.counters.add_processed();
                    processed += 1;
                    break;
                }
                Err(back) => {
                    if ctx.counters.stop_requested() {
                        return processed;
                    }
                    pending = back;
                    thread::yield_now();
                }
            }
        }
    }

    processed
}

pub struct StrategyCtx {
    /// Consumer end of this strategy's own stage-2 ring.
    pub stage2: RingConsumer<Message>,
    pub sink: Arc<LatencySink>,
    pub counters: Arc<PipelineCounters>,
}

/// Record per-stage latencies for every message reaching this strategy.
///
/// Exit is stop-flag-only, no drain: messages still queued in the ring at
/// stop time stay undelivered and the summary reflects them that way.
pub fn run_strategy(ctx: StrategyCtx) -> u64 {
    let mut delivered: u64 = 0;

    while !ctx.counters.stop_requested() {
        let msg = match ctx.stage2.try_pop() {
            Some(msg) => msg,
            None => {
                thread::yield_now();
                continue;
            }
        };

        let t_end = clock::now_ns();
        let stage1_us = (msg.processed_ns - msg.timestamp_ns) as f64 / 1000.0;
        let stage2_us = (t_end - msg.processed_ns) as f64 / 1000.0;
        // Nothing runs between stage-1 exit and stage-2 entry, so the hop
        // latency doubles as the processing figure.
        let processing_us = stage2_us;
        let total_us = (t_end - msg.timestamp_ns) as f64 / 1000.0;

        ctx.sink.record(stage1_us, processing_us, stage2_us, total_us);
        ctx.counters.add_delivered();
        delivered += 1;
    }

    delivered
}
