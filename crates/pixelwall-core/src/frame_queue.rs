//! Single-slot blocking hand-off between frame producers and the display
//!
//! - `put` blocks while a previous frame has not been taken yet (backpressure)
//! - `get` blocks until a frame is available
//! - `close` wakes every waiter; afterwards `put` fails and `get` returns `None`
//!
//! Frames travel over a `bounded(1)` channel, so the display always shows the
//! most recently completed frame instead of draining a backlog. Closing drops
//! the only sender of a shutdown channel; every blocked operation selects on
//! its disconnection.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Select, Sender, TryRecvError};
use parking_lot::Mutex;
use thiserror::Error;

use crate::frame::PixelBuffer;
use crate::{CoreError, Result};

/// Failure of a bounded-time put
#[derive(Error, Debug)]
pub enum PutTimeoutError {
    /// The slot stayed occupied; the frame is handed back
    #[error("frame queue still full after timeout")]
    Timeout(PixelBuffer),
    /// The queue was closed
    #[error("frame queue closed")]
    Closed,
}

/// Cloneable handle to the single frame slot
#[derive(Clone)]
pub struct FrameQueue {
    frames_tx: Sender<PixelBuffer>,
    frames_rx: Receiver<PixelBuffer>,
    shutdown_tx: Arc<Mutex<Option<Sender<()>>>>,
    shutdown_rx: Receiver<()>,
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameQueue {
    /// Create an empty, open queue
    pub fn new() -> Self {
        let (frames_tx, frames_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded(0);
        Self {
            frames_tx,
            frames_rx,
            shutdown_tx: Arc::new(Mutex::new(Some(shutdown_tx))),
            shutdown_rx,
        }
    }

    /// Hand over a frame, blocking until the slot is free
    pub fn put(&self, frame: PixelBuffer) -> Result<()> {
        if self.is_closed() {
            return Err(CoreError::QueueClosed);
        }
        select! {
            send(self.frames_tx, frame) -> sent => sent.map_err(|_| CoreError::QueueClosed),
            recv(self.shutdown_rx) -> _ => Err(CoreError::QueueClosed),
        }
    }

    /// Hand over a frame, waiting at most `timeout` for the slot to free up
    pub fn put_timeout(
        &self,
        frame: PixelBuffer,
        timeout: Duration,
    ) -> std::result::Result<(), PutTimeoutError> {
        if self.is_closed() {
            return Err(PutTimeoutError::Closed);
        }
        let mut sel = Select::new();
        let send_index = sel.send(&self.frames_tx);
        let shutdown_index = sel.recv(&self.shutdown_rx);
        match sel.select_timeout(timeout) {
            Err(_) => Err(PutTimeoutError::Timeout(frame)),
            Ok(oper) if oper.index() == send_index => oper
                .send(&self.frames_tx, frame)
                .map_err(|_| PutTimeoutError::Closed),
            Ok(oper) => {
                debug_assert_eq!(oper.index(), shutdown_index);
                let _ = oper.recv(&self.shutdown_rx);
                Err(PutTimeoutError::Closed)
            }
        }
    }

    /// Take the pending frame, blocking until one arrives; `None` once closed
    pub fn get(&self) -> Option<PixelBuffer> {
        if self.is_closed() {
            return None;
        }
        select! {
            recv(self.frames_rx) -> frame => frame.ok(),
            recv(self.shutdown_rx) -> _ => None,
        }
    }

    /// Take the pending frame if there is one
    pub fn try_get(&self) -> Option<PixelBuffer> {
        if self.is_closed() {
            return None;
        }
        self.frames_rx.try_recv().ok()
    }

    /// Take a frame, waiting at most `timeout`
    pub fn get_timeout(&self, timeout: Duration) -> Option<PixelBuffer> {
        if self.is_closed() {
            return None;
        }
        select! {
            recv(self.frames_rx) -> frame => frame.ok(),
            recv(self.shutdown_rx) -> _ => None,
            default(timeout) => None,
        }
    }

    /// Is a frame waiting to be taken?
    pub fn has_pending(&self) -> bool {
        !self.is_closed() && !self.frames_rx.is_empty()
    }

    /// Shut the queue down and wake all blocked producers and consumers
    pub fn close(&self) {
        // A frame left in the slot is unreachable: every read checks for
        // shutdown first
        self.shutdown_tx.lock().take();
    }

    /// Has the queue been closed?
    pub fn is_closed(&self) -> bool {
        matches!(self.shutdown_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sending side of the frame slot, for callers that select on it
    pub(crate) fn sender(&self) -> &Sender<PixelBuffer> {
        &self.frames_tx
    }

    /// Becomes ready (disconnected) once the queue is closed
    pub(crate) fn shutdown_receiver(&self) -> &Receiver<()> {
        &self.shutdown_rx
    }
}
