//! Server metrics.
//!
//! Static counters registered with metriken. With a single reactor thread
//! there is no write contention, so plain counters suffice.

use metriken::{Counter, Gauge, metric};

#[metric(
    name = "connections_accepted",
    description = "Total number of connections accepted"
)]
pub static CONNECTIONS_ACCEPTED: Counter = Counter::new();

#[metric(
    name = "connections_active",
    description = "Number of currently active connections"
)]
pub static CONNECTIONS_ACTIVE: Gauge = Gauge::new();

#[metric(name = "cache_gets", description = "Total GET operations")]
pub static GETS: Counter = Counter::new();

#[metric(name = "cache_sets", description = "Total SET operations")]
pub static SETS: Counter = Counter::new();

#[metric(name = "cache_deletes", description = "Total DEL operations")]
pub static DELETES: Counter = Counter::new();

#[metric(name = "cache_hits", description = "Total cache hits")]
pub static HITS: Counter = Counter::new();

#[metric(name = "cache_misses", description = "Total cache misses")]
pub static MISSES: Counter = Counter::new();

#[metric(
    name = "protocol_errors",
    description = "Total protocol parse errors (each closes its connection)"
)]
pub static PROTOCOL_ERRORS: Counter = Counter::new();
