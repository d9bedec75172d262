//! The display loop: sole owner of the output device
//!
//! Polls the frame queue at a fixed tick, shows whatever frame is pending and
//! gives the scheduler one decision per tick. Nothing else ever writes to the
//! display.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::display::Display;
use crate::frame_queue::FrameQueue;
use crate::scheduler::AnimationScheduler;
use crate::{CoreError, Result};

/// Fixed-rate consumer of the frame queue
pub struct DisplayLoop<D: Display> {
    display: D,
    queue: FrameQueue,
    scheduler: Option<AnimationScheduler>,
    frame_interval: Duration,
    running: Arc<AtomicBool>,
    frames_shown: u64,
}

impl<D: Display> DisplayLoop<D> {
    /// Create a loop ticking `fps` times per second
    pub fn new(display: D, queue: FrameQueue, fps: u32) -> Self {
        Self {
            display,
            queue,
            scheduler: None,
            frame_interval: Duration::from_secs(1) / fps.max(1),
            running: Arc::new(AtomicBool::new(true)),
            frames_shown: 0,
        }
    }

    /// Let `scheduler` pick producers on every tick
    pub fn with_scheduler(mut self, scheduler: AnimationScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Flag that keeps the loop alive; store `false` to stop it
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Frames written to the display so far
    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    /// The scheduler, if one is attached
    pub fn scheduler_mut(&mut self) -> Option<&mut AnimationScheduler> {
        self.scheduler.as_mut()
    }

    /// Consume the loop and return the display
    pub fn into_display(self) -> D {
        self.display
    }

    /// Run until the running flag is cleared or the display fails
    ///
    /// On exit the queue is closed, the producer stopped and the display
    /// blanked. A hardware error is returned after that cleanup.
    pub fn run(&mut self) -> Result<()> {
        info!(
            "Display loop started ({:?} per frame, {})",
            self.frame_interval,
            self.display.dimensions()
        );

        let result = loop {
            if !self.running.load(Ordering::Relaxed) {
                break Ok(());
            }
            let start = Instant::now();

            if let Some(frame) = self.queue.try_get() {
                match self.display.show(&frame) {
                    Ok(()) => self.frames_shown += 1,
                    Err(e @ CoreError::DimensionMismatch { .. }) => {
                        warn!("Dropping frame: {}", e);
                    }
                    Err(e) => break Err(e),
                }
            }

            if let Some(scheduler) = &mut self.scheduler {
                scheduler.tick();
            }

            let elapsed = start.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        };

        self.finish();
        info!("Display loop stopped after {} frames", self.frames_shown);
        result
    }

    fn finish(&mut self) {
        self.queue.close();
        if let Some(scheduler) = &mut self.scheduler {
            scheduler.shutdown();
        }
        if let Err(e) = self.display.clear() {
            warn!("Failed to blank display: {}", e);
        } else {
            debug!("Display blanked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::display::Apa102Display;
    use crate::frame::{Dimensions, PixelBuffer, Rgb};
    use crate::wiring::WiringConfig;
    use std::thread;

    #[test]
    fn test_shows_queued_frame_then_blanks() {
        let bus = MemoryBus::new();
        let display = Apa102Display::new(bus.clone(), &WiringConfig::new(2, 2)).unwrap();
        let queue = FrameQueue::new();
        let mut display_loop = DisplayLoop::new(display, queue.clone(), 100);
        let running = display_loop.running_flag();

        let producer = thread::spawn(move || {
            queue
                .put(PixelBuffer::filled(Dimensions::new(2, 2), Rgb::new(255, 0, 0)))
                .unwrap();
            thread::sleep(Duration::from_millis(100));
            running.store(false, Ordering::Relaxed);
            // The loop closes the queue on exit
            thread::sleep(Duration::from_millis(100));
            queue.put(PixelBuffer::new(Dimensions::new(2, 2)))
        });

        display_loop.run().unwrap();
        assert_eq!(display_loop.frames_shown(), 1);
        assert!(matches!(producer.join().unwrap(), Err(CoreError::QueueClosed)));

        let frames = bus.frames();
        assert_eq!(frames.len(), 2);
        // Default gamma and BGR order: red lands in the last channel slot
        assert_eq!(&frames[0][4..8], &[0xFF, 0, 0, 255]);
        assert_eq!(&frames[1][4..8], &[0xFF, 0, 0, 0]);
    }

    #[test]
    fn test_hardware_error_stops_loop() {
        let bus = MemoryBus::new();
        bus.set_failing(true);
        let display = Apa102Display::new(bus, &WiringConfig::new(1, 1)).unwrap();
        let queue = FrameQueue::new();
        queue.put(PixelBuffer::new(Dimensions::new(1, 1))).unwrap();

        let mut display_loop = DisplayLoop::new(display, queue.clone(), 100);
        assert!(matches!(display_loop.run(), Err(CoreError::HardwareIo(_))));
        assert!(queue.is_closed());
    }

    #[test]
    fn test_wrong_size_frame_is_dropped() {
        let bus = MemoryBus::new();
        let display = Apa102Display::new(bus.clone(), &WiringConfig::new(2, 2)).unwrap();
        let queue = FrameQueue::new();
        queue.put(PixelBuffer::new(Dimensions::new(3, 3))).unwrap();

        let mut display_loop = DisplayLoop::new(display, queue, 100);
        let running = display_loop.running_flag();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            running.store(false, Ordering::Relaxed);
        });
        display_loop.run().unwrap();
        stopper.join().unwrap();

        assert_eq!(display_loop.frames_shown(), 0);
        // Only the blanking frame reached the bus
        assert_eq!(bus.write_count(), 1);
    }
}
