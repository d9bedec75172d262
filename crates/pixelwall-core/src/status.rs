//! Flags shared between the network ingest thread and the scheduler

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Flags {
    receiving: AtomicBool,
    display_owned: AtomicBool,
}

/// Who is feeding the display right now
///
/// `receiving` is written only by the ingest server; `display_owned` is
/// written only by the scheduler. Each side reads the other's flag.
#[derive(Debug, Clone, Default)]
pub struct StreamStatus {
    flags: Arc<Flags>,
}

impl StreamStatus {
    /// Create a status with both flags cleared
    pub fn new() -> Self {
        Self::default()
    }

    /// Is a network stream currently active?
    pub fn is_receiving(&self) -> bool {
        self.flags.receiving.load(Ordering::Acquire)
    }

    /// Mark the network stream active or idle
    pub fn set_receiving(&self, receiving: bool) {
        self.flags.receiving.store(receiving, Ordering::Release);
    }

    /// Does a scheduled producer currently own the display?
    pub fn is_display_owned(&self) -> bool {
        self.flags.display_owned.load(Ordering::Acquire)
    }

    /// Mark the display owned by a producer or free
    pub fn set_display_owned(&self, owned: bool) {
        self.flags.display_owned.store(owned, Ordering::Release);
    }
}
