//! Cooperative cancellation for a calibration run.
//!
//! A token carries a shared flag (set by whoever drives the batch) and an
//! optional per-trip deadline. Long stages poll [`CancelToken::check`].

use crate::error::{CalResult, CalibrationError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Child sharing this token's flag, with its own deadline.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    pub fn check(&self) -> CalResult<()> {
        if self.is_cancelled() {
            return Err(CalibrationError::Cancelled);
        }
        if self.is_expired() {
            return Err(CalibrationError::TimedOut);
        }
        Ok(())
    }
}
