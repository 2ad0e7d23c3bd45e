//! BlinkDB cache server.
//!
//! A single-threaded, non-blocking RESP-2 server over the tiered storage
//! engine in `blinkdb-cache`. One reactor thread owns the listener, every
//! connection, and the engine; there are no locks and no cross-thread
//! state.

pub mod config;
pub mod connection;
pub mod execute;
pub mod logging;
pub mod metrics;
pub mod reactor;
pub mod signal;

pub use config::Config;
pub use reactor::Reactor;
