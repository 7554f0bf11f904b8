pub mod clock;
pub mod controller;
pub mod counters;
pub mod latency;
pub mod message;
pub mod pinning;
pub mod ring;
pub mod routing;
pub mod workers;
