//! Animation scheduler
//!
//! Owns the active producer and decides, once per display tick, what runs
//! next. Priority, highest first:
//!
//! 1. a network stream holds the `receiving` flag: nothing is started and a
//!    running producer is interrupted for later resumption
//! 2. an explicitly requested producer
//! 3. producers interrupted earlier, most recent first, recreated from their
//!    resume parameters
//! 4. the playlist, by round-robin or random selection over enabled kinds
//!
//! Stopping is cooperative. A stopped producer stays in `current` until its
//! thread has exited, so two producers never feed the queue at once.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::frame::Dimensions;
use crate::frame_queue::FrameQueue;
use crate::producer::{ProducerFactory, ProducerHandle, ProducerKind, ProducerParams};
use crate::status::StreamStatus;

/// Interrupted producers kept for resumption; the oldest is dropped beyond this
const MAX_PENDING_RESUMES: usize = 8;

/// Playlist selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Walk the playlist in order
    #[default]
    RoundRobin,
    /// Pick a random eligible entry
    Random,
}

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Playlist selection policy
    pub selection: Selection,
    /// Upper bound on one producer's run time, 0 for none
    pub max_duration_secs: u64,
    /// Kinds eligible for automatic selection
    pub enabled: Vec<ProducerKind>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            selection: Selection::RoundRobin,
            max_duration_secs: 60,
            enabled: vec![
                ProducerKind::Blm,
                ProducerKind::Gameframe,
                ProducerKind::Moodlight,
                ProducerKind::Clock,
                ProducerKind::Text,
            ],
        }
    }
}

impl SchedulerConfig {
    /// Configured maximum run time
    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_secs > 0).then(|| Duration::from_secs(self.max_duration_secs))
    }
}

/// Scheduler state after the last tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No producer is running
    Idle,
    /// A producer owns the display
    ProducerRunning,
    /// A producer was stopped and waits to be resumed
    Interrupted,
}

#[derive(Debug)]
enum Command {
    Request(ProducerParams),
    Skip,
    SetEnabled(ProducerKind, bool),
}

/// Cloneable remote control for a scheduler living on another thread
///
/// Commands are applied on the scheduler's next tick.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: Sender<Command>,
}

impl SchedulerHandle {
    /// Play `params` next, interrupting the current producer
    pub fn request(&self, params: ProducerParams) -> bool {
        self.commands.send(Command::Request(params)).is_ok()
    }

    /// Stop the current producer without resuming it
    pub fn skip(&self) -> bool {
        self.commands.send(Command::Skip).is_ok()
    }

    /// Enable or disable a kind for automatic selection
    pub fn set_enabled(&self, kind: ProducerKind, enabled: bool) -> bool {
        self.commands
            .send(Command::SetEnabled(kind, enabled))
            .is_ok()
    }
}

struct Running {
    handle: ProducerHandle,
    limit: Option<Duration>,
}

/// Selects, starts, bounds and interrupts frame producers
pub struct AnimationScheduler {
    config: SchedulerConfig,
    enabled: BTreeSet<ProducerKind>,
    factories: HashMap<ProducerKind, Box<dyn ProducerFactory>>,
    playlist: Vec<ProducerParams>,
    next_index: usize,
    queue: FrameQueue,
    status: StreamStatus,
    dimensions: Dimensions,
    current: Option<Running>,
    /// Interrupted producers, most recent last
    resume: Vec<ProducerParams>,
    requested: Option<ProducerParams>,
    commands_tx: Sender<Command>,
    commands_rx: Receiver<Command>,
}

impl AnimationScheduler {
    /// Create a scheduler feeding `queue`
    pub fn new(
        config: SchedulerConfig,
        queue: FrameQueue,
        status: StreamStatus,
        dimensions: Dimensions,
    ) -> Self {
        let (commands_tx, commands_rx) = unbounded();
        Self {
            enabled: config.enabled.iter().copied().collect(),
            config,
            factories: HashMap::new(),
            playlist: Vec::new(),
            next_index: 0,
            queue,
            status,
            dimensions,
            current: None,
            resume: Vec::new(),
            requested: None,
            commands_tx,
            commands_rx,
        }
    }

    /// Register the factory for one producer kind, replacing any earlier one
    pub fn register(&mut self, factory: Box<dyn ProducerFactory>) {
        self.factories.insert(factory.kind(), factory);
    }

    /// Replace the selectable list
    pub fn set_playlist(&mut self, playlist: Vec<ProducerParams>) {
        self.playlist = playlist;
        self.next_index = 0;
    }

    /// The selectable list
    pub fn playlist(&self) -> &[ProducerParams] {
        &self.playlist
    }

    /// A remote control for other threads
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            commands: self.commands_tx.clone(),
        }
    }

    /// Enable or disable a kind for automatic selection
    pub fn set_enabled(&mut self, kind: ProducerKind, enabled: bool) {
        if enabled {
            self.enabled.insert(kind);
        } else {
            self.enabled.remove(&kind);
        }
        debug!("Producer kind {} enabled: {}", kind, enabled);
    }

    /// Kinds currently eligible for automatic selection
    pub fn enabled_kinds(&self) -> Vec<ProducerKind> {
        self.enabled.iter().copied().collect()
    }

    /// Play `params` next; a running producer is interrupted and resumed afterwards
    pub fn request(&mut self, params: ProducerParams) {
        info!("Requested producer {}", params.kind);
        self.requested = Some(params);
        self.stop_current(true);
    }

    /// Stop the current producer for good
    pub fn skip(&mut self) {
        self.stop_current(false);
    }

    /// Signal the active producer to stop, keeping its parameters if `resume`
    pub fn stop_current(&mut self, resume: bool) {
        let Some(running) = &self.current else {
            return;
        };
        if running.handle.is_stopping() {
            return;
        }
        if resume {
            let params = running.handle.resume_params();
            info!(
                "Interrupting producer {} (resume with {:?})",
                params.kind, params.repeat
            );
            self.resume.push(params);
            if self.resume.len() > MAX_PENDING_RESUMES {
                let dropped = self.resume.remove(0);
                warn!("Too many interrupted producers, forgetting {}", dropped.kind);
            }
        } else {
            info!("Stopping producer {}", running.handle.kind());
        }
        running.handle.stop();
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        match &self.current {
            Some(running) if !running.handle.is_stopping() => SchedulerState::ProducerRunning,
            _ if !self.resume.is_empty() => SchedulerState::Interrupted,
            _ => SchedulerState::Idle,
        }
    }

    /// Kind of the producer currently owning the display
    pub fn current_kind(&self) -> Option<ProducerKind> {
        self.current.as_ref().map(|running| running.handle.kind())
    }

    /// Live resume parameters of the producer owning the display
    pub fn current_params(&self) -> Option<ProducerParams> {
        self.current
            .as_ref()
            .map(|running| running.handle.resume_params())
    }

    /// Parameters that will be resumed next
    pub fn pending_resume(&self) -> Option<&ProducerParams> {
        self.resume.last()
    }

    /// Every interrupted producer awaiting resumption, most recent last
    pub fn pending_resumes(&self) -> &[ProducerParams] {
        &self.resume
    }

    /// Run one scheduling decision
    pub fn tick(&mut self) {
        self.apply_commands();
        self.reap();

        let receiving = self.status.is_receiving();
        if let Some(running) = &self.current {
            if receiving {
                self.stop_current(true);
            } else if let Some(limit) = running.limit {
                if running.handle.started_at().elapsed() >= limit {
                    debug!("Producer {} reached its run limit {:?}", running.handle.kind(), limit);
                    self.stop_current(false);
                }
            }
            return;
        }

        if receiving || self.queue.is_closed() {
            return;
        }

        let next = self
            .requested
            .take()
            .or_else(|| self.resume.pop())
            .or_else(|| self.pick_next());
        if let Some(params) = next {
            self.start(params);
        }
    }

    /// Stop the active producer and wait for its thread
    pub fn shutdown(&mut self) {
        self.stop_current(false);
        if let Some(mut running) = self.current.take() {
            running.handle.join();
        }
        self.status.set_display_owned(false);
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands_rx.try_recv() {
            match command {
                Command::Request(params) => self.request(params),
                Command::Skip => self.skip(),
                Command::SetEnabled(kind, enabled) => self.set_enabled(kind, enabled),
            }
        }
    }

    fn reap(&mut self) {
        let finished = self
            .current
            .as_ref()
            .is_some_and(|running| !running.handle.is_alive());
        if finished {
            if let Some(mut running) = self.current.take() {
                running.handle.join();
                debug!("Producer {} exited", running.handle.kind());
            }
            self.status.set_display_owned(false);
        }
    }

    fn selectable(&self, params: &ProducerParams) -> bool {
        self.enabled.contains(&params.kind) && self.factories.contains_key(&params.kind)
    }

    fn pick_next(&mut self) -> Option<ProducerParams> {
        // Without a playlist every registered kind is a candidate
        let candidates: Vec<ProducerParams> = if self.playlist.is_empty() {
            let mut kinds: Vec<ProducerKind> = self.factories.keys().copied().collect();
            kinds.sort();
            kinds.into_iter().map(ProducerParams::new).collect()
        } else {
            self.playlist.clone()
        };
        if candidates.is_empty() {
            return None;
        }

        match self.config.selection {
            Selection::RoundRobin => {
                let len = candidates.len();
                for offset in 0..len {
                    let index = (self.next_index + offset) % len;
                    if self.selectable(&candidates[index]) {
                        self.next_index = (index + 1) % len;
                        return Some(candidates[index].clone());
                    }
                }
                None
            }
            Selection::Random => {
                let eligible: Vec<&ProducerParams> =
                    candidates.iter().filter(|p| self.selectable(p)).collect();
                if eligible.is_empty() {
                    return None;
                }
                let index = rand::rng().random_range(0..eligible.len());
                Some(eligible[index].clone())
            }
        }
    }

    fn start(&mut self, params: ProducerParams) {
        let Some(factory) = self.factories.get(&params.kind) else {
            warn!("No factory registered for producer {}", params.kind);
            return;
        };
        let producer = match factory.create(&params, self.dimensions) {
            Ok(producer) => producer,
            Err(e) => {
                warn!("Failed to create producer {}: {}", params.kind, e);
                return;
            }
        };

        // A zero-length pass carries no usable bound
        let pass = producer.intrinsic_duration().filter(|pass| !pass.is_zero());
        let intrinsic_bound = match (pass, params.repeat.passes()) {
            (Some(pass), Some(passes)) => Some(pass.saturating_mul(passes)),
            _ => None,
        };
        let limit = match (intrinsic_bound, self.config.max_duration()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        // Claimed before the thread exists so ingest never races the first frame
        self.status.set_display_owned(true);
        match ProducerHandle::spawn(producer, params, self.queue.clone(), self.dimensions) {
            Ok(handle) => self.current = Some(Running { handle, limit }),
            Err(e) => {
                self.status.set_display_owned(false);
                warn!("{}", e);
            }
        }
    }
}

impl Drop for AnimationScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PixelBuffer, Rgb};
    use crate::producer::{Producer, ProducerContext, Repeat};
    use crate::Result;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    /// Emits a solid frame then holds until stopped or `pass` elapsed
    struct Solid {
        kind: ProducerKind,
        pass: Duration,
    }

    impl Producer for Solid {
        fn kind(&self) -> ProducerKind {
            self.kind
        }

        fn intrinsic_duration(&self) -> Option<Duration> {
            Some(self.pass)
        }

        fn run(&mut self, ctx: &ProducerContext) -> Result<()> {
            loop {
                if !ctx.emit(PixelBuffer::filled(ctx.dimensions(), Rgb::WHITE)) {
                    return Ok(());
                }
                if !ctx.hold(self.pass) || !ctx.finish_pass() {
                    return Ok(());
                }
            }
        }
    }

    struct SolidFactory(ProducerKind, Duration);

    impl ProducerFactory for SolidFactory {
        fn kind(&self) -> ProducerKind {
            self.0
        }

        fn create(&self, _params: &ProducerParams, _dims: Dimensions) -> Result<Box<dyn Producer>> {
            Ok(Box::new(Solid {
                kind: self.0,
                pass: self.1,
            }))
        }
    }

    fn scheduler(config: SchedulerConfig) -> (AnimationScheduler, FrameQueue, StreamStatus) {
        let queue = FrameQueue::new();
        let status = StreamStatus::new();
        let mut scheduler =
            AnimationScheduler::new(config, queue.clone(), status.clone(), Dimensions::new(2, 2));
        scheduler.register(Box::new(SolidFactory(ProducerKind::Moodlight, Duration::from_secs(30))));
        scheduler.register(Box::new(SolidFactory(ProducerKind::Clock, Duration::from_secs(30))));
        (scheduler, queue, status)
    }

    fn tick_until(
        scheduler: &mut AnimationScheduler,
        queue: &FrameQueue,
        done: impl Fn(&AnimationScheduler) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(&*scheduler) {
            assert!(Instant::now() < deadline, "scheduler did not settle");
            queue.try_get();
            scheduler.tick();
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_round_robin_over_enabled_kinds() {
        let (mut scheduler, queue, status) = scheduler(SchedulerConfig::default());
        scheduler.set_playlist(vec![
            ProducerParams::new(ProducerKind::Moodlight),
            ProducerParams::new(ProducerKind::Blm),
            ProducerParams::new(ProducerKind::Clock),
        ]);

        scheduler.tick();
        assert_eq!(scheduler.current_kind(), Some(ProducerKind::Moodlight));
        assert!(status.is_display_owned());

        scheduler.skip();
        // Blm has no factory, so Clock is next
        tick_until(&mut scheduler, &queue, |s| s.current_kind() == Some(ProducerKind::Clock));
        assert_eq!(scheduler.state(), SchedulerState::ProducerRunning);
    }

    #[test]
    fn test_disabled_kind_is_skipped() {
        let (mut scheduler, _queue, _status) = scheduler(SchedulerConfig::default());
        scheduler.set_enabled(ProducerKind::Clock, false);
        assert!(!scheduler.enabled_kinds().contains(&ProducerKind::Clock));
        scheduler.set_playlist(vec![ProducerParams::new(ProducerKind::Clock)]);
        scheduler.tick();
        assert_eq!(scheduler.current_kind(), None);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_receiving_interrupts_and_resumes() {
        let (mut scheduler, queue, status) = scheduler(SchedulerConfig::default());
        scheduler.set_playlist(vec![
            ProducerParams::new(ProducerKind::Moodlight).with_repeat(Repeat::Times(4)),
            ProducerParams::new(ProducerKind::Clock),
        ]);
        scheduler.tick();
        assert_eq!(scheduler.current_kind(), Some(ProducerKind::Moodlight));

        status.set_receiving(true);
        tick_until(&mut scheduler, &queue, |s| s.current_kind().is_none());
        assert_eq!(scheduler.state(), SchedulerState::Interrupted);
        assert!(!status.is_display_owned());

        // Nothing starts while the stream is active
        scheduler.tick();
        assert_eq!(scheduler.current_kind(), None);

        status.set_receiving(false);
        scheduler.tick();
        assert_eq!(scheduler.current_kind(), Some(ProducerKind::Moodlight));
        assert!(scheduler.pending_resume().is_none());
    }

    /// Reports a short pass but holds far longer
    struct Lingering;

    impl Producer for Lingering {
        fn kind(&self) -> ProducerKind {
            ProducerKind::Text
        }

        fn intrinsic_duration(&self) -> Option<Duration> {
            Some(Duration::from_millis(30))
        }

        fn run(&mut self, ctx: &ProducerContext) -> Result<()> {
            ctx.hold(Duration::from_secs(10));
            Ok(())
        }
    }

    struct LingeringFactory;

    impl ProducerFactory for LingeringFactory {
        fn kind(&self) -> ProducerKind {
            ProducerKind::Text
        }

        fn create(&self, _params: &ProducerParams, _dims: Dimensions) -> Result<Box<dyn Producer>> {
            Ok(Box::new(Lingering))
        }
    }

    #[test]
    fn test_intrinsic_duration_bounds_run_time() {
        let queue = FrameQueue::new();
        let mut scheduler = AnimationScheduler::new(
            SchedulerConfig::default(),
            queue.clone(),
            StreamStatus::new(),
            Dimensions::new(1, 1),
        );
        scheduler.register(Box::new(LingeringFactory));
        scheduler.set_playlist(vec![
            ProducerParams::new(ProducerKind::Text).with_repeat(Repeat::Times(1))
        ]);

        scheduler.tick();
        assert_eq!(scheduler.current_kind(), Some(ProducerKind::Text));
        let started = Instant::now();

        // Two passes of 30ms, far below the 60s maximum
        thread::sleep(Duration::from_millis(80));
        scheduler.tick();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        scheduler.set_enabled(ProducerKind::Text, false);
        tick_until(&mut scheduler, &queue, |s| s.current_kind().is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_forever_without_max_duration_keeps_running() {
        let config = SchedulerConfig {
            max_duration_secs: 0,
            ..SchedulerConfig::default()
        };
        let queue = FrameQueue::new();
        let mut scheduler =
            AnimationScheduler::new(config, queue.clone(), StreamStatus::new(), Dimensions::new(1, 1));
        scheduler.register(Box::new(SolidFactory(ProducerKind::Text, Duration::from_millis(40))));
        scheduler.set_playlist(vec![
            ProducerParams::new(ProducerKind::Text).with_repeat(Repeat::Forever)
        ]);

        scheduler.tick();
        thread::sleep(Duration::from_millis(200));
        queue.try_get();
        scheduler.tick();
        assert_eq!(scheduler.state(), SchedulerState::ProducerRunning);
        assert_eq!(scheduler.current_kind(), Some(ProducerKind::Text));
    }

    #[test]
    fn test_stream_during_request_keeps_both_resumes() {
        let (mut scheduler, queue, status) = scheduler(SchedulerConfig::default());
        scheduler.set_playlist(vec![
            ProducerParams::new(ProducerKind::Moodlight).with_repeat(Repeat::Times(7))
        ]);
        scheduler.tick();
        assert_eq!(scheduler.current_kind(), Some(ProducerKind::Moodlight));

        scheduler.request(ProducerParams::new(ProducerKind::Clock));
        tick_until(&mut scheduler, &queue, |s| s.current_kind() == Some(ProducerKind::Clock));

        status.set_receiving(true);
        tick_until(&mut scheduler, &queue, |s| s.current_kind().is_none());
        let pending: Vec<(ProducerKind, Repeat)> = scheduler
            .pending_resumes()
            .iter()
            .map(|p| (p.kind, p.repeat))
            .collect();
        assert_eq!(
            pending,
            vec![
                (ProducerKind::Moodlight, Repeat::Times(7)),
                (ProducerKind::Clock, Repeat::Times(0)),
            ]
        );

        // Most recent interruption comes back first
        status.set_receiving(false);
        scheduler.tick();
        assert_eq!(scheduler.current_kind(), Some(ProducerKind::Clock));

        scheduler.skip();
        tick_until(&mut scheduler, &queue, |s| s.current_kind() == Some(ProducerKind::Moodlight));
        let resumed = scheduler.current_params().unwrap();
        assert_eq!(resumed.repeat, Repeat::Times(7));
        assert!(scheduler.pending_resumes().is_empty());
    }

    #[test]
    fn test_zero_length_pass_is_not_a_bound() {
        let config = SchedulerConfig {
            max_duration_secs: 0,
            ..SchedulerConfig::default()
        };
        let (mut scheduler, _queue, status) = scheduler(config);
        scheduler.register(Box::new(SolidFactory(ProducerKind::Blm, Duration::ZERO)));
        scheduler.request(ProducerParams::new(ProducerKind::Blm).with_repeat(Repeat::Times(1000)));

        scheduler.tick();
        assert_eq!(scheduler.current_kind(), Some(ProducerKind::Blm));
        thread::sleep(Duration::from_millis(50));
        scheduler.tick();
        assert_eq!(scheduler.state(), SchedulerState::ProducerRunning);
        assert!(status.is_display_owned());
    }

    /// Records whether the display was already claimed when its thread began
    struct OwnershipRecorder {
        status: StreamStatus,
        owned_at_start: Arc<AtomicBool>,
    }

    impl Producer for OwnershipRecorder {
        fn kind(&self) -> ProducerKind {
            ProducerKind::Gameframe
        }

        fn run(&mut self, ctx: &ProducerContext) -> Result<()> {
            self.owned_at_start
                .store(self.status.is_display_owned(), Ordering::SeqCst);
            ctx.hold(Duration::from_secs(10));
            Ok(())
        }
    }

    struct OwnershipRecorderFactory(StreamStatus, Arc<AtomicBool>);

    impl ProducerFactory for OwnershipRecorderFactory {
        fn kind(&self) -> ProducerKind {
            ProducerKind::Gameframe
        }

        fn create(&self, _params: &ProducerParams, _dims: Dimensions) -> Result<Box<dyn Producer>> {
            Ok(Box::new(OwnershipRecorder {
                status: self.0.clone(),
                owned_at_start: self.1.clone(),
            }))
        }
    }

    #[test]
    fn test_display_claimed_before_producer_runs() {
        let (mut scheduler, _queue, status) = scheduler(SchedulerConfig::default());
        let owned_at_start = Arc::new(AtomicBool::new(false));
        scheduler.register(Box::new(OwnershipRecorderFactory(status.clone(), owned_at_start.clone())));
        scheduler.request(ProducerParams::new(ProducerKind::Gameframe));
        scheduler.tick();
        assert_eq!(scheduler.current_kind(), Some(ProducerKind::Gameframe));

        thread::sleep(Duration::from_millis(50));
        assert!(owned_at_start.load(Ordering::SeqCst));
        scheduler.shutdown();
        assert!(!status.is_display_owned());
    }

    #[test]
    fn test_handle_commands_apply_on_tick() {
        let (mut scheduler, queue, _status) = scheduler(SchedulerConfig::default());
        scheduler.set_playlist(vec![ProducerParams::new(ProducerKind::Moodlight)]);
        scheduler.tick();

        let handle = scheduler.handle();
        assert!(handle.request(ProducerParams::new(ProducerKind::Clock)));
        tick_until(&mut scheduler, &queue, |s| s.current_kind() == Some(ProducerKind::Clock));

        // The interrupted producer comes back after the request ends
        assert_eq!(
            scheduler.pending_resume().map(|p| p.kind),
            Some(ProducerKind::Moodlight)
        );
        assert!(handle.skip());
        tick_until(&mut scheduler, &queue, |s| s.current_kind() == Some(ProducerKind::Moodlight));
    }
}
