//! Panic Handler
//!
//! Routes panics through `tracing` so they land in the same log stream as
//! decisions. Rule panics are caught by the block evaluator and turned into
//! faults; the hook still records them so a misbehaving rule is visible.

use std::panic;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{error, warn};

static PANIC_HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);
static PANIC_COUNT: AtomicU64 = AtomicU64::new(0);

/// Install the logging panic hook. Call once, early in `main`.
///
/// # Example
/// ```no_run
/// use indexgate::panic_handler;
///
/// fn main() {
///     panic_handler::install_panic_hook();
/// }
/// ```
pub fn install_panic_hook() {
    if PANIC_HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        warn!("Panic hook already installed, skipping");
        return;
    }

    panic::set_hook(Box::new(|info| {
        PANIC_COUNT.fetch_add(1, Ordering::Relaxed);

        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic message".to_string()
        };

        error!(
            location = %location,
            thread = std::thread::current().name().unwrap_or("unnamed"),
            "panic: {}",
            message
        );

        if std::env::var("RUST_BACKTRACE").is_err() {
            warn!("Backtrace not available - set RUST_BACKTRACE=1 for detailed traces");
        }
    }));

    tracing::info!("Panic hook installed");
}

pub fn is_panic_hook_installed() -> bool {
    PANIC_HOOK_INSTALLED.load(Ordering::SeqCst)
}

/// Panics observed since the hook was installed.
pub fn panic_count() -> u64 {
    PANIC_COUNT.load(Ordering::Relaxed)
}
