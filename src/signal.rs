//! Shutdown signalling.
//!
//! `ShutdownFlag` is flipped by SIGINT/SIGTERM; the stream reader checks it
//! on every wake-up, which is the only point where the pipeline stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Trait for checking shutdown status.
pub trait ShutdownCheck: Send + Sync {
    /// Returns true once shutdown has been requested.
    fn should_stop(&self) -> bool;
}

/// Shared flag that records a shutdown request.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Create a flag and register it as the process's Ctrl+C / SIGTERM handler.
    pub fn install() -> Result<Self, ctrlc::Error> {
        let shutdown = Self::manual();
        let flag = shutdown.flag.clone();
        ctrlc::set_handler(move || {
            log::info!("Received shutdown signal, stopping after the current alert...");
            flag.store(true, Ordering::SeqCst);
        })?;
        Ok(shutdown)
    }

    /// Create a flag without registering any handler.
    pub fn manual() -> Self {
        ShutdownFlag {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request shutdown.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl ShutdownCheck for ShutdownFlag {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Checker that always requests shutdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysShutdown;

impl ShutdownCheck for AlwaysShutdown {
    fn should_stop(&self) -> bool {
        true
    }
}
