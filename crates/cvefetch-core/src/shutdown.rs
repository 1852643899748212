//! Graceful shutdown support via a shared atomic flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation flag checked between pagination steps and retry attempts.
///
/// Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Route SIGINT/SIGTERM to this flag.
    ///
    /// First signal sets the flag; a second one exits immediately with 130.
    pub fn install_signal_handlers(&self) -> std::io::Result<()> {
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            let flag = Arc::clone(&self.0);
            // SAFETY: the handler only performs an atomic swap and `low_level::exit`,
            // both async-signal-safe
            unsafe {
                signal_hook::low_level::register(signal, move || {
                    if flag.swap(true, Ordering::Relaxed) {
                        signal_hook::low_level::exit(130);
                    }
                })?;
            }
        }
        Ok(())
    }
}
