//! tpm2-net UDP listener
//!
//! Runs on its own thread. While datagrams flow, an inactivity timer checks
//! every `check_interval` whether the stream went quiet for longer than
//! `timeout`; if so the `receiving` flag is cleared and the session reset,
//! handing the display back to the scheduler. While idle no timer runs.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pixelwall_core::{Dimensions, FrameQueue, PixelBuffer, PutTimeoutError, StreamStatus, Tpm2NetConfig};
use tracing::{debug, info, trace, warn};

use super::session::{PacketOutcome, SessionStats, Tpm2NetSession};
use crate::Result;

/// Upper bound on how long the listener sleeps in `recv`, bounding shutdown latency
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);
/// Slice used when waiting for the display to take a frame
const PUT_POLL: Duration = Duration::from_millis(50);
/// Largest possible UDP payload
const MAX_DATAGRAM: usize = 65_536;

/// Single rescheduling deadline; arming an armed timer is a no-op, so at
/// most one check is ever outstanding
#[derive(Debug)]
pub struct InactivityTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl InactivityTimer {
    /// Create a disarmed timer
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Start the timer unless it is already running
    pub fn arm(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.interval);
        }
    }

    /// Schedule the next check one interval from `now`
    pub fn reschedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    /// Stop the timer
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Is a check scheduled?
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Has the scheduled check come due?
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Time until the next check, if armed
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

/// Everything the listener thread owns
struct Listener {
    socket: UdpSocket,
    session: Tpm2NetSession,
    timer: InactivityTimer,
    timeout: Duration,
    queue: FrameQueue,
    status: StreamStatus,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<SessionStats>>,
}

impl Listener {
    fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        while self.running.load(Ordering::Relaxed) {
            let wait = self
                .timer
                .remaining(Instant::now())
                .map_or(SHUTDOWN_POLL, |left| left.min(SHUTDOWN_POLL))
                .max(Duration::from_millis(1));
            if let Err(e) = self.socket.set_read_timeout(Some(wait)) {
                warn!("Failed to set tpm2-net read timeout: {}", e);
            }

            match self.socket.recv_from(&mut buf) {
                Ok((len, peer)) => self.on_datagram(&buf[..len], peer),
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                Err(e) => {
                    warn!("tpm2-net receive failed: {}", e);
                    thread::sleep(SHUTDOWN_POLL);
                }
            }

            let now = Instant::now();
            if self.timer.is_due(now) {
                if self.session.check_timeout(now, self.timeout) {
                    self.timer.disarm();
                    self.status.set_receiving(false);
                } else {
                    self.timer.reschedule(now);
                }
            }
            *self.stats.lock() = self.session.stats();
        }

        self.status.set_receiving(false);
        debug!("tpm2-net listener stopped");
    }

    fn on_datagram(&mut self, datagram: &[u8], peer: SocketAddr) {
        let now = Instant::now();
        match self.session.handle(datagram, now) {
            Err(e) => trace!("Dropping datagram from {}: {}", peer, e),
            Ok(PacketOutcome::Ignored(_)) => {}
            Ok(outcome) => {
                self.status.set_receiving(true);
                self.timer.arm(now);
                if let PacketOutcome::FrameComplete(frame) = outcome {
                    self.deliver(frame);
                }
            }
        }
    }

    /// Hand a frame to the display unless a scheduled producer still owns it
    fn deliver(&mut self, frame: PixelBuffer) {
        if self.status.is_display_owned() {
            trace!("Display still owned by a producer, dropping tpm2-net frame");
            return;
        }
        let mut frame = frame;
        while self.running.load(Ordering::Relaxed) {
            match self.queue.put_timeout(frame, PUT_POLL) {
                Ok(()) => return,
                Err(PutTimeoutError::Timeout(returned)) => frame = returned,
                Err(PutTimeoutError::Closed) => {
                    debug!("Frame queue closed, stopping tpm2-net listener");
                    self.running.store(false, Ordering::Relaxed);
                    return;
                }
            }
        }
    }
}

/// Handle to the running listener thread
pub struct Tpm2NetServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<SessionStats>>,
    thread: Option<JoinHandle<()>>,
}

impl Tpm2NetServer {
    /// Bind the socket and start listening
    pub fn spawn(
        config: &Tpm2NetConfig,
        dimensions: Dimensions,
        queue: FrameQueue,
        status: StreamStatus,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind)?;
        let local_addr = socket.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(Mutex::new(SessionStats::default()));

        let listener = Listener {
            socket,
            session: Tpm2NetSession::new(dimensions),
            timer: InactivityTimer::new(config.check_interval()),
            timeout: config.timeout(),
            queue,
            status,
            running: running.clone(),
            stats: stats.clone(),
        };
        let thread = thread::Builder::new()
            .name("tpm2net".to_string())
            .spawn(move || listener.run())?;

        info!("tpm2-net listening on {} for {} frames", local_addr, dimensions);

        Ok(Self {
            local_addr,
            running,
            stats,
            thread: Some(thread),
        })
    }

    /// Bound address (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Counters as of the listener's last loop iteration
    pub fn stats(&self) -> SessionStats {
        *self.stats.lock()
    }

    /// Is the listener thread still running?
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the listener and wait for its thread
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("tpm2-net listener panicked");
            }
        }
    }
}

impl Drop for Tpm2NetServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
