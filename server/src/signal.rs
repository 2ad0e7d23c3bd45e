//! Signal handling for graceful shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Install a SIGINT/SIGTERM handler.
///
/// Returns a flag that flips to `true` on the first shutdown signal; the
/// reactor observes it between poll cycles, drains, and persists the disk
/// index before exiting. A second signal forces immediate exit.
pub fn install_signal_handler() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();

    ctrlc::set_handler(move || {
        if shutdown_flag.swap(true, Ordering::SeqCst) {
            tracing::warn!("second signal received, forcing exit");
            std::process::exit(1);
        }
        tracing::info!("shutdown signal received, draining");
    })
    .expect("failed to install signal handler");

    shutdown
}
