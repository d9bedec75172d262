//! Byte-level LED bus abstraction

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

/// Sink for encoded wire frames
///
/// Exactly one display owns a bus; no other thread writes to it.
pub trait LedBus: Send {
    /// Write one complete wire frame
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<B: LedBus + ?Sized> LedBus for Box<B> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }
}

/// In-memory bus that records every frame written to it
///
/// Clones share the same record, so a test can keep one handle while the
/// display owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// All frames written so far
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }

    /// The most recent frame
    pub fn last_frame(&self) -> Option<Vec<u8>> {
        self.frames.lock().last().cloned()
    }

    /// Number of frames written
    pub fn write_count(&self) -> usize {
        self.frames.lock().len()
    }

    /// Make subsequent writes fail with a broken-pipe error
    pub fn set_failing(&self, failing: bool) {
        *self.fail_writes.lock() = failing;
    }
}

impl LedBus for MemoryBus {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if *self.fail_writes.lock() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "bus write failed"));
        }
        self.frames.lock().push(bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_bus_records_frames() {
        let bus = MemoryBus::new();
        let mut writer = bus.clone();
        writer.write(&[1, 2, 3]).unwrap();
        writer.write(&[4]).unwrap();
        assert_eq!(bus.write_count(), 2);
        assert_eq!(bus.last_frame(), Some(vec![4]));
    }

    #[test]
    fn test_memory_bus_failure() {
        let bus = MemoryBus::new();
        bus.set_failing(true);
        let mut writer = bus.clone();
        assert!(writer.write(&[0]).is_err());
        assert_eq!(bus.write_count(), 0);
    }
}
