// src/cancel.rs

//! Cooperative cancellation
//!
//! A cheap cloneable token polled at I/O boundaries (network fetches,
//! per-entry checkout and enumeration). Cancellation is advisory: an
//! in-flight pull keeps the objects it already stored, a cancelled
//! checkout leaves its partial tree for the sweep paths.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation handle shared between a caller and a running operation
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; running operations notice at their next poll
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Poll point: returns `Error::Cancelled` once `cancel` was called
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
