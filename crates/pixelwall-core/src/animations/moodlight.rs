//! Procedural mood light
//!
//! Three modes:
//! - `colorwheel` (alias `fill`): the whole matrix walks the hue circle
//! - `cyclecolors`: random dots fade through a fixed color list
//! - `wish_down_up`: rows scroll up, each new bottom row takes the next hue

use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

use crate::frame::{Dimensions, PixelBuffer, Rgb, BYTES_PER_PIXEL};
use crate::producer::{Producer, ProducerContext, ProducerFactory, ProducerKind, ProducerParams};
use crate::{CoreError, Result};

const FRAMES_PER_SECOND: u32 = 60;
const WHEEL_STEPS: usize = 500;
const FADE_STEPS: usize = 5;
const COLOR_HOLD_FRAMES: usize = 100;
const CYCLE_COLORS: [Rgb; 4] = [
    Rgb::new(255, 0, 0),
    Rgb::new(255, 255, 0),
    Rgb::new(0, 255, 255),
    Rgb::new(0, 0, 255),
];

/// Rendering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoodlightMode {
    /// Solid fill walking the hue circle
    ColorWheel,
    /// Random dots fading through a color list
    CycleColors,
    /// Hue rows scrolling upwards
    #[default]
    WishDownUp,
}

impl FromStr for MoodlightMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "colorwheel" | "fill" => Ok(MoodlightMode::ColorWheel),
            "cyclecolors" => Ok(MoodlightMode::CycleColors),
            "wish_down_up" => Ok(MoodlightMode::WishDownUp),
            other => Err(CoreError::Configuration(format!(
                "unknown moodlight mode '{}'",
                other
            ))),
        }
    }
}

/// HSV to RGB with hue in degrees and saturation/value in 0.0..=1.0
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb {
    let h = hue.rem_euclid(360.0) / 60.0;
    let sector = h.floor();
    let f = h - sector;
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - saturation * f);
    let t = value * (1.0 - saturation * (1.0 - f));
    let (r, g, b) = match sector as u32 {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    };
    let to_byte = |c: f32| (c * 255.0) as u8;
    Rgb::new(to_byte(r), to_byte(g), to_byte(b))
}

fn color_wheel() -> Vec<Rgb> {
    let step = 360.0 / WHEEL_STEPS as f32;
    (0..WHEEL_STEPS)
        .map(|i| hsv_to_rgb(i as f32 * step, 1.0, 1.0))
        .collect()
}

/// Fade from each color to the next, then hold it
fn color_cycle(colors: &[Rgb]) -> Vec<Rgb> {
    let Some(&last) = colors.last() else {
        return Vec::new();
    };
    let mut sequence = Vec::with_capacity(colors.len() * (FADE_STEPS + COLOR_HOLD_FRAMES));
    let mut current = [f32::from(last.r), f32::from(last.g), f32::from(last.b)];
    for target in colors {
        let target = [f32::from(target.r), f32::from(target.g), f32::from(target.b)];
        let increment = [
            (target[0] - current[0]) / FADE_STEPS as f32,
            (target[1] - current[1]) / FADE_STEPS as f32,
            (target[2] - current[2]) / FADE_STEPS as f32,
        ];
        for _ in 0..FADE_STEPS {
            for channel in 0..3 {
                current[channel] += increment[channel];
            }
            sequence.push(Rgb::new(current[0] as u8, current[1] as u8, current[2] as u8));
        }
        let held = sequence.last().copied().unwrap_or_default();
        sequence.extend(std::iter::repeat(held).take(COLOR_HOLD_FRAMES));
    }
    sequence
}

/// Shift all rows up by one and paint the bottom row
fn scroll_up(frame: &mut PixelBuffer, color: Rgb) {
    let row_len = frame.cols() * BYTES_PER_PIXEL;
    let bytes = frame.as_bytes_mut();
    bytes.copy_within(row_len.., 0);
    let bottom = frame.rows().saturating_sub(1);
    for col in 0..frame.cols() {
        frame.set_pixel(bottom, col, color);
    }
}

/// Mood light producer; one pass is one full color sequence
pub struct MoodlightAnimation {
    mode: MoodlightMode,
    dimensions: Dimensions,
    colors: Vec<Rgb>,
}

impl MoodlightAnimation {
    /// Create a mood light for the matrix
    pub fn new(mode: MoodlightMode, dimensions: Dimensions) -> Self {
        let colors = match mode {
            MoodlightMode::ColorWheel | MoodlightMode::WishDownUp => color_wheel(),
            MoodlightMode::CycleColors => color_cycle(&CYCLE_COLORS),
        };
        Self {
            mode,
            dimensions,
            colors,
        }
    }

    /// Active mode
    pub fn mode(&self) -> MoodlightMode {
        self.mode
    }

    fn frame_interval() -> Duration {
        Duration::from_secs(1) / FRAMES_PER_SECOND
    }

    fn next_frame(&self, frame: &mut PixelBuffer, color: Rgb) {
        match self.mode {
            MoodlightMode::ColorWheel => frame.fill(color),
            MoodlightMode::CycleColors => {
                let mut rng = rand::rng();
                let row = rng.random_range(0..self.dimensions.rows);
                let col = rng.random_range(0..self.dimensions.cols);
                frame.set_pixel(row, col, color);
            }
            MoodlightMode::WishDownUp => scroll_up(frame, color),
        }
    }
}

impl Producer for MoodlightAnimation {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Moodlight
    }

    fn intrinsic_duration(&self) -> Option<Duration> {
        Some(Self::frame_interval() * self.colors.len() as u32)
    }

    fn run(&mut self, ctx: &ProducerContext) -> Result<()> {
        let mut frame = PixelBuffer::new(self.dimensions);
        loop {
            for &color in &self.colors {
                self.next_frame(&mut frame, color);
                if !ctx.emit(frame.clone()) || !ctx.hold(Self::frame_interval()) {
                    return Ok(());
                }
            }
            if !ctx.finish_pass() {
                return Ok(());
            }
        }
    }
}

/// Creates [`MoodlightAnimation`]s; `mode` selects the rendering mode
#[derive(Debug, Clone, Copy, Default)]
pub struct MoodlightFactory;

impl ProducerFactory for MoodlightFactory {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Moodlight
    }

    fn create(&self, params: &ProducerParams, dimensions: Dimensions) -> Result<Box<dyn Producer>> {
        let mode = match &params.mode {
            Some(name) => name.parse()?,
            None => MoodlightMode::default(),
        };
        Ok(Box::new(MoodlightAnimation::new(mode, dimensions)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_queue::FrameQueue;
    use crate::producer::Repeat;

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb::new(255, 0, 0));
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), Rgb::new(0, 255, 0));
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), Rgb::new(0, 0, 255));
        assert_eq!(hsv_to_rgb(360.0, 1.0, 1.0), Rgb::new(255, 0, 0));
        assert_eq!(hsv_to_rgb(42.0, 0.0, 0.0), Rgb::BLACK);
    }

    #[test]
    fn test_color_cycle_reaches_each_color() {
        let sequence = color_cycle(&CYCLE_COLORS);
        assert_eq!(sequence.len(), CYCLE_COLORS.len() * (FADE_STEPS + COLOR_HOLD_FRAMES));
        assert_eq!(sequence[FADE_STEPS], CYCLE_COLORS[0]);
        assert_eq!(
            sequence[2 * (FADE_STEPS + COLOR_HOLD_FRAMES) - 1],
            CYCLE_COLORS[1]
        );
    }

    #[test]
    fn test_scroll_up_moves_rows() {
        let dims = Dimensions::new(3, 2);
        let mut frame = PixelBuffer::new(dims);
        scroll_up(&mut frame, Rgb::new(1, 1, 1));
        scroll_up(&mut frame, Rgb::new(2, 2, 2));
        assert_eq!(frame.pixel(0, 0), Some(Rgb::BLACK));
        assert_eq!(frame.pixel(1, 1), Some(Rgb::new(1, 1, 1)));
        assert_eq!(frame.pixel(2, 0), Some(Rgb::new(2, 2, 2)));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("fill".parse::<MoodlightMode>().unwrap(), MoodlightMode::ColorWheel);
        assert_eq!(
            "wish_down_up".parse::<MoodlightMode>().unwrap(),
            MoodlightMode::WishDownUp
        );
        assert!("strobe".parse::<MoodlightMode>().is_err());
    }

    #[test]
    fn test_run_emits_until_stopped() {
        let dims = Dimensions::new(2, 2);
        let queue = FrameQueue::new();
        let ctx = ProducerContext::new(queue.clone(), dims, Repeat::Forever);
        let stop = ctx.stop_flag().clone();

        let consumer = std::thread::spawn(move || {
            let mut frames = Vec::new();
            while frames.len() < 3 {
                if let Some(frame) = queue.get_timeout(Duration::from_secs(1)) {
                    frames.push(frame);
                }
            }
            stop.stop();
            frames
        });

        let mut animation = MoodlightAnimation::new(MoodlightMode::ColorWheel, dims);
        animation.run(&ctx).unwrap();

        let frames = consumer.join().unwrap();
        assert_eq!(frames[0].pixel(0, 0), Some(Rgb::new(255, 0, 0)));
        assert!(frames.iter().all(|f| f.pixels().all(|p| p == f.pixel(1, 1).unwrap())));
    }
}
