//! Built-in frame producers

pub mod blm;
pub mod moodlight;

pub use blm::{BlmAnimation, BlmFactory, BlmMovie, BlmPalette};
pub use moodlight::{MoodlightAnimation, MoodlightFactory, MoodlightMode};

use crate::producer::ProducerFactory;

/// Factories for every built-in producer
pub fn default_factories() -> Vec<Box<dyn ProducerFactory>> {
    vec![Box::new(BlmFactory::default()), Box::new(MoodlightFactory)]
}
