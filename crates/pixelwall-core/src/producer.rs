//! Frame producer interface
//!
//! A producer runs on its own thread, pushes frames through a
//! [`ProducerContext`] and must poll the stop flag at least once per frame
//! hold. The scheduler only sees [`ProducerHandle`]s; it never depends on a
//! concrete producer type.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::frame::{Dimensions, PixelBuffer};
use crate::frame_queue::FrameQueue;
use crate::{CoreError, Result};

/// Content class of a producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    /// Blinkenlights movie files
    Blm,
    /// Gameframe bitmap folders
    Gameframe,
    /// Procedural color fades
    Moodlight,
    /// Clock face
    Clock,
    /// Scrolling text
    Text,
}

impl fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProducerKind::Blm => "blm",
            ProducerKind::Gameframe => "gameframe",
            ProducerKind::Moodlight => "moodlight",
            ProducerKind::Clock => "clock",
            ProducerKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// Remaining repetitions after the current pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    /// Never ends on its own
    Forever,
    /// Play `n` more passes after the current one
    Times(u32),
}

impl Default for Repeat {
    fn default() -> Self {
        Repeat::Times(0)
    }
}

impl Repeat {
    /// Passes still to play including the current one, `None` if unbounded
    pub fn passes(self) -> Option<u32> {
        match self {
            Repeat::Forever => None,
            Repeat::Times(n) => Some(n.saturating_add(1)),
        }
    }

    /// State after a pass completes, `None` when the producer is done
    pub fn after_pass(self) -> Option<Repeat> {
        match self {
            Repeat::Forever => Some(Repeat::Forever),
            Repeat::Times(0) => None,
            Repeat::Times(n) => Some(Repeat::Times(n - 1)),
        }
    }
}

/// Serializable parameter set that recreates a producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerParams {
    /// Content class
    pub kind: ProducerKind,
    /// Source file or folder, for file-based producers
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Producer-specific mode name
    #[serde(default)]
    pub mode: Option<String>,
    /// Remaining repetitions
    #[serde(default)]
    pub repeat: Repeat,
}

impl ProducerParams {
    /// Parameters for a single pass of `kind`
    pub fn new(kind: ProducerKind) -> Self {
        Self {
            kind,
            path: None,
            mode: None,
            repeat: Repeat::default(),
        }
    }

    /// Set the source path
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the mode name
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Set the repetitions
    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }
}

/// Cooperative cancellation flag
///
/// Stopping drops the only sender of an internal channel, which wakes every
/// receiver at once.
#[derive(Clone)]
pub struct StopFlag {
    stop_tx: Arc<Mutex<Option<Sender<()>>>>,
    stop_rx: Receiver<()>,
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl StopFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = bounded(0);
        Self {
            stop_tx: Arc::new(Mutex::new(Some(stop_tx))),
            stop_rx,
        }
    }

    /// Request the producer to stop
    pub fn stop(&self) {
        self.stop_tx.lock().take();
    }

    /// Has a stop been requested?
    pub fn is_stopped(&self) -> bool {
        matches!(self.stop_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `timeout` or until stopped; returns `true` if stopped
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.stop_rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Becomes ready (disconnected) once stopped
    fn receiver(&self) -> &Receiver<()> {
        &self.stop_rx
    }
}

impl fmt::Debug for StopFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopFlag")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Everything a running producer may touch
pub struct ProducerContext {
    queue: FrameQueue,
    stop: StopFlag,
    remaining: Arc<Mutex<Repeat>>,
    dimensions: Dimensions,
}

impl ProducerContext {
    /// Create a context that feeds `queue`
    pub fn new(queue: FrameQueue, dimensions: Dimensions, repeat: Repeat) -> Self {
        Self {
            queue,
            stop: StopFlag::new(),
            remaining: Arc::new(Mutex::new(repeat)),
            dimensions,
        }
    }

    /// Matrix size every emitted frame must have
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// The stop flag observed by this context
    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Should the producer exit now?
    pub fn should_stop(&self) -> bool {
        self.stop.is_stopped() || self.queue.is_closed()
    }

    /// Push a frame to the display, blocking while the slot is occupied.
    /// Returns `false` if the producer was stopped or the queue closed.
    pub fn emit(&self, frame: PixelBuffer) -> bool {
        if self.should_stop() {
            return false;
        }
        select! {
            send(self.queue.sender(), frame) -> sent => sent.is_ok(),
            recv(self.stop.receiver()) -> _ => false,
            recv(self.queue.shutdown_receiver()) -> _ => false,
        }
    }

    /// Hold the current frame for `duration`; returns `false` if stopped meanwhile
    pub fn hold(&self, duration: Duration) -> bool {
        if self.should_stop() {
            return false;
        }
        select! {
            recv(self.stop.receiver()) -> _ => false,
            recv(self.queue.shutdown_receiver()) -> _ => false,
            default(duration) => true,
        }
    }

    /// Record a completed pass; returns `true` if another pass is due
    pub fn finish_pass(&self) -> bool {
        let mut remaining = self.remaining.lock();
        match remaining.after_pass() {
            Some(next) => {
                *remaining = next;
                true
            }
            None => false,
        }
    }

    /// Repetitions left after the current pass
    pub fn remaining(&self) -> Repeat {
        *self.remaining.lock()
    }
}

/// A source of frames
pub trait Producer: Send {
    /// Content class
    fn kind(&self) -> ProducerKind;

    /// Length of one pass, if the content has a natural length
    fn intrinsic_duration(&self) -> Option<Duration> {
        None
    }

    /// Produce frames until done or stopped
    fn run(&mut self, ctx: &ProducerContext) -> Result<()>;
}

/// Builds producers of one kind from their parameters
pub trait ProducerFactory: Send {
    /// Kind of producer this factory creates
    fn kind(&self) -> ProducerKind;

    /// Create a producer sized for the matrix
    fn create(
        &self,
        params: &ProducerParams,
        dimensions: Dimensions,
    ) -> Result<Box<dyn Producer>>;
}

/// A producer running on its own thread
pub struct ProducerHandle {
    params: ProducerParams,
    started_at: Instant,
    intrinsic_duration: Option<Duration>,
    stop: StopFlag,
    remaining: Arc<Mutex<Repeat>>,
    thread: Option<JoinHandle<()>>,
}

impl ProducerHandle {
    /// Start `producer` on a new thread
    pub fn spawn(
        mut producer: Box<dyn Producer>,
        params: ProducerParams,
        queue: FrameQueue,
        dimensions: Dimensions,
    ) -> Result<Self> {
        let kind = producer.kind();
        let intrinsic_duration = producer.intrinsic_duration();
        let ctx = ProducerContext::new(queue, dimensions, params.repeat);
        let stop = ctx.stop.clone();
        let remaining = ctx.remaining.clone();

        let thread = thread::Builder::new()
            .name(format!("producer-{}", kind))
            .spawn(move || {
                debug!("Producer {} started", kind);
                match producer.run(&ctx) {
                    Ok(()) => debug!("Producer {} finished", kind),
                    Err(e) => warn!("Producer {} failed: {}", kind, e),
                }
            })
            .map_err(|e| CoreError::Producer(format!("failed to spawn {} thread: {}", kind, e)))?;

        info!("Started producer {} ({:?})", kind, params.repeat);

        Ok(Self {
            params,
            started_at: Instant::now(),
            intrinsic_duration,
            stop,
            remaining,
            thread: Some(thread),
        })
    }

    /// Content class
    pub fn kind(&self) -> ProducerKind {
        self.params.kind
    }

    /// When the producer was started
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Length of one pass as reported by the producer
    pub fn intrinsic_duration(&self) -> Option<Duration> {
        self.intrinsic_duration
    }

    /// Request a cooperative stop
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Has a stop been requested?
    pub fn is_stopping(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Is the producer thread still running?
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Parameters that recreate this producer from where it is now
    pub fn resume_params(&self) -> ProducerParams {
        ProducerParams {
            repeat: *self.remaining.lock(),
            ..self.params.clone()
        }
    }

    /// Wait for the thread to exit
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Producer {} panicked", self.params.kind);
            }
        }
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rgb;

    #[test]
    fn test_repeat_after_pass() {
        assert_eq!(Repeat::Times(2).after_pass(), Some(Repeat::Times(1)));
        assert_eq!(Repeat::Times(0).after_pass(), None);
        assert_eq!(Repeat::Forever.after_pass(), Some(Repeat::Forever));
        assert_eq!(Repeat::Times(2).passes(), Some(3));
        assert_eq!(Repeat::Forever.passes(), None);
    }

    #[test]
    fn test_stop_flag_wakes_sleeper() {
        let flag = StopFlag::new();
        let sleeper = {
            let flag = flag.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let stopped = flag.wait_timeout(Duration::from_secs(10));
                (stopped, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(50));
        flag.stop();
        let (stopped, elapsed) = sleeper.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_emit_gives_up_when_stopped() {
        let queue = FrameQueue::new();
        let dims = Dimensions::new(1, 1);
        let ctx = ProducerContext::new(queue.clone(), dims, Repeat::Forever);
        assert!(ctx.emit(PixelBuffer::filled(dims, Rgb::WHITE)));

        // Slot is full; a stop must release the blocked emit
        let stop = ctx.stop_flag().clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            stop.stop();
        });
        assert!(!ctx.emit(PixelBuffer::new(dims)));
        stopper.join().unwrap();
    }

    #[test]
    fn test_hold_wakes_on_queue_close() {
        let queue = FrameQueue::new();
        let dims = Dimensions::new(1, 1);
        let ctx = ProducerContext::new(queue.clone(), dims, Repeat::Forever);
        assert!(ctx.hold(Duration::from_millis(10)));

        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            queue.close();
        });
        let start = Instant::now();
        assert!(!ctx.hold(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        closer.join().unwrap();
        assert!(!ctx.emit(PixelBuffer::new(dims)));
    }

    #[test]
    fn test_params_toml_round_trip() {
        let params = ProducerParams::new(ProducerKind::Blm)
            .with_path("movies/intro.blm")
            .with_repeat(Repeat::Times(3));
        let text = toml::to_string(&params).unwrap();
        let parsed: ProducerParams = toml::from_str(&text).unwrap();
        assert_eq!(parsed, params);
    }
}
