//! Blinkenlights movie (`.blm`) playback
//!
//! File format, one line at a time:
//!
//! ```text
//! # comment
//! @100        <- starts a frame held for 100 ms
//! 0110
//! 1001        <- one row per line, '1' lit, '0' dark
//! ```
//!
//! Movies of a different size are centred, padded or cropped to the matrix.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::frame::{Dimensions, PixelBuffer, Rgb};
use crate::producer::{Producer, ProducerContext, ProducerFactory, ProducerKind, ProducerParams};
use crate::{CoreError, Result};

/// One frame of a parsed movie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlmFrame {
    /// How long the frame stays on screen
    pub hold: Duration,
    /// Lit state per pixel, row by row
    pub rows: Vec<Vec<bool>>,
}

impl BlmFrame {
    fn height(&self) -> usize {
        self.rows.len()
    }

    fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

/// A parsed movie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlmMovie {
    frames: Vec<BlmFrame>,
}

impl BlmMovie {
    /// Parse movie text; malformed frames are skipped, an empty movie is an error
    pub fn parse(text: &str) -> Result<Self> {
        let mut frames = Vec::new();
        let mut hold = Duration::ZERO;
        let mut lines: Vec<&str> = Vec::new();

        for line in text.lines().map(str::trim) {
            if line.starts_with('#') {
                continue;
            }
            if let Some(value) = line.strip_prefix('@') {
                flush_frame(&mut frames, hold, &mut lines);
                let millis: u64 = value.trim().parse().map_err(|_| {
                    CoreError::Producer(format!("invalid blm hold time '{}'", value))
                })?;
                hold = Duration::from_millis(millis);
            } else if !line.is_empty() {
                lines.push(line);
            }
        }
        flush_frame(&mut frames, hold, &mut lines);

        if frames.is_empty() {
            return Err(CoreError::Producer("blm movie contains no frames".to_string()));
        }
        Ok(Self { frames })
    }

    /// Read a movie file (Latin-1 encoded)
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            CoreError::Producer(format!("cannot read {}: {}", path.display(), e))
        })?;
        let text: String = bytes.iter().map(|&b| char::from(b)).collect();
        Self::parse(&text)
    }

    /// Parsed frames
    pub fn frames(&self) -> &[BlmFrame] {
        &self.frames
    }

    /// Sum of all hold times
    pub fn duration(&self) -> Duration {
        self.frames.iter().map(|f| f.hold).sum()
    }
}

fn flush_frame(frames: &mut Vec<BlmFrame>, hold: Duration, lines: &mut Vec<&str>) {
    if lines.is_empty() {
        return;
    }
    match parse_rows(lines) {
        Some(rows) => frames.push(BlmFrame { hold, rows }),
        None => warn!("Skipping malformed blm frame ({} lines)", lines.len()),
    }
    lines.clear();
}

fn parse_rows(lines: &[&str]) -> Option<Vec<Vec<bool>>> {
    let rows: Option<Vec<Vec<bool>>> = lines
        .iter()
        .map(|line| {
            line.chars()
                .map(|c| match c {
                    '0' => Some(false),
                    '1' => Some(true),
                    _ => None,
                })
                .collect()
        })
        .collect();
    let rows = rows?;
    let width = rows.first()?.len();
    rows.iter().all(|row| row.len() == width).then_some(rows)
}

/// Colors used to render a movie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlmPalette {
    /// Lit pixels
    pub foreground: Rgb,
    /// Dark pixels
    pub background: Rgb,
    /// Area outside a movie smaller than the matrix
    pub padding: Rgb,
}

impl Default for BlmPalette {
    fn default() -> Self {
        Self {
            foreground: Rgb::new(255, 255, 255),
            background: Rgb::new(10, 10, 10),
            padding: Rgb::new(60, 60, 60),
        }
    }
}

/// Map an output coordinate to a movie coordinate. Odd differences pad the
/// top/left edge by one more line, or crop the bottom/right edge by one more.
fn source_index(out: usize, movie_len: usize, matrix_len: usize) -> Option<usize> {
    let diff = movie_len as isize - matrix_len as isize;
    let source = out as isize + diff.div_euclid(2);
    (0..movie_len as isize)
        .contains(&source)
        .then_some(source as usize)
}

/// Render one frame to the matrix size
pub fn render_frame(frame: &BlmFrame, dimensions: Dimensions, palette: &BlmPalette) -> PixelBuffer {
    let mut buffer = PixelBuffer::filled(dimensions, palette.padding);
    for row in 0..dimensions.rows {
        let Some(src_row) = source_index(row, frame.height(), dimensions.rows) else {
            continue;
        };
        for col in 0..dimensions.cols {
            if let Some(src_col) = source_index(col, frame.width(), dimensions.cols) {
                let lit = frame.rows[src_row][src_col];
                let color = if lit { palette.foreground } else { palette.background };
                buffer.set_pixel(row, col, color);
            }
        }
    }
    buffer
}

/// Plays a `.blm` movie
pub struct BlmAnimation {
    path: PathBuf,
    frames: Vec<(PixelBuffer, Duration)>,
    duration: Duration,
}

impl BlmAnimation {
    /// Render `movie` for the matrix
    pub fn new(
        path: PathBuf,
        movie: &BlmMovie,
        dimensions: Dimensions,
        palette: &BlmPalette,
    ) -> Self {
        let frames = movie
            .frames()
            .iter()
            .map(|frame| (render_frame(frame, dimensions, palette), frame.hold))
            .collect();
        Self {
            path,
            frames,
            duration: movie.duration(),
        }
    }

    /// Number of frames per pass
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl Producer for BlmAnimation {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Blm
    }

    fn intrinsic_duration(&self) -> Option<Duration> {
        Some(self.duration)
    }

    fn run(&mut self, ctx: &ProducerContext) -> Result<()> {
        debug!("Playing {}", self.path.display());
        loop {
            for (frame, hold) in &self.frames {
                if !ctx.emit(frame.clone()) || !ctx.hold(*hold) {
                    return Ok(());
                }
            }
            if !ctx.finish_pass() {
                return Ok(());
            }
        }
    }
}

/// Creates [`BlmAnimation`]s from a `path` parameter
#[derive(Debug, Clone, Default)]
pub struct BlmFactory {
    palette: BlmPalette,
}

impl BlmFactory {
    /// Factory rendering with `palette`
    pub fn new(palette: BlmPalette) -> Self {
        Self { palette }
    }
}

impl ProducerFactory for BlmFactory {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Blm
    }

    fn create(&self, params: &ProducerParams, dimensions: Dimensions) -> Result<Box<dyn Producer>> {
        let path = params
            .path
            .clone()
            .ok_or_else(|| CoreError::Producer("blm producer needs a path".to_string()))?;
        let movie = BlmMovie::load(&path)?;
        let animation = BlmAnimation::new(path, &movie, dimensions, &self.palette);
        info!(
            "Loaded blm {}: {} frames, {:?}",
            animation.path.display(),
            animation.frame_count(),
            animation.duration
        );
        Ok(Box::new(animation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOVIE: &str = "# BlinkenLights Movie 2x3\n\
                         @100\n\
                         010\n\
                         101\n\
                         \n\
                         @250\n\
                         111\n\
                         000\n";

    #[test]
    fn test_parse_movie() {
        let movie = BlmMovie::parse(MOVIE).unwrap();
        assert_eq!(movie.frames().len(), 2);
        assert_eq!(movie.frames()[0].hold, Duration::from_millis(100));
        assert_eq!(movie.frames()[0].rows[0], vec![false, true, false]);
        assert_eq!(movie.duration(), Duration::from_millis(350));
    }

    #[test]
    fn test_malformed_frames_are_skipped() {
        let movie = BlmMovie::parse("@10\n01\n011\n@20\n0x\n@30\n11\n").unwrap();
        assert_eq!(movie.frames().len(), 1);
        assert_eq!(movie.frames()[0].hold, Duration::from_millis(30));
    }

    #[test]
    fn test_empty_movie_is_error() {
        assert!(BlmMovie::parse("# nothing\n").is_err());
        assert!(BlmMovie::parse("@abc\n01\n").is_err());
    }

    #[test]
    fn test_render_pads_and_centres() {
        let movie = BlmMovie::parse("@1\n1\n").unwrap();
        let palette = BlmPalette::default();
        let buffer = render_frame(&movie.frames()[0], Dimensions::new(3, 4), &palette);
        // 1x1 movie in a 3x4 matrix: one row above, two columns left
        assert_eq!(buffer.pixel(1, 2), Some(palette.foreground));
        assert_eq!(buffer.pixel(1, 1), Some(palette.padding));
        assert_eq!(buffer.pixel(0, 0), Some(palette.padding));
        assert_eq!(buffer.pixel(2, 3), Some(palette.padding));
    }

    #[test]
    fn test_render_crops_centre() {
        let movie = BlmMovie::parse("@1\n0000\n0110\n0110\n0000\n").unwrap();
        let palette = BlmPalette::default();
        let buffer = render_frame(&movie.frames()[0], Dimensions::new(2, 2), &palette);
        assert!(buffer.pixels().all(|p| p == palette.foreground));
    }

    #[test]
    fn test_render_odd_crop_drops_bottom_row() {
        // 3 rows into 2: the bottom row is cropped
        let movie = BlmMovie::parse("@1\n1\n0\n1\n").unwrap();
        let palette = BlmPalette::default();
        let buffer = render_frame(&movie.frames()[0], Dimensions::new(2, 1), &palette);
        assert_eq!(buffer.pixel(0, 0), Some(palette.foreground));
        assert_eq!(buffer.pixel(1, 0), Some(palette.background));
    }

    #[test]
    fn test_factory_requires_path() {
        let factory = BlmFactory::default();
        let result = factory.create(&ProducerParams::new(ProducerKind::Blm), Dimensions::new(2, 2));
        assert!(result.is_err());
    }

    #[test]
    fn test_factory_loads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie.blm");
        fs::write(&path, MOVIE).unwrap();

        let params = ProducerParams::new(ProducerKind::Blm).with_path(&path);
        let producer = BlmFactory::default()
            .create(&params, Dimensions::new(2, 3))
            .unwrap();
        assert_eq!(producer.kind(), ProducerKind::Blm);
        assert_eq!(producer.intrinsic_duration(), Some(Duration::from_millis(350)));
    }
}
