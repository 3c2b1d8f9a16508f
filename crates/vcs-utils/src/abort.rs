//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared cancellation flag.
///
/// Long-running operations hold a clone and call [`check`](AbortSignal::check)
/// at object and phase boundaries; any holder may [`raise`](AbortSignal::raise)
/// it. Cloning is cheap and shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

/// Raised when an operation observes the abort signal.
#[derive(Debug, thiserror::Error)]
#[error("operation aborted")]
pub struct Aborted;

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn raise(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Fail with [`Aborted`] if cancellation has been requested.
    pub fn check(&self) -> Result<(), Aborted> {
        if self.is_raised() {
            Err(Aborted)
        } else {
            Ok(())
        }
    }
}
