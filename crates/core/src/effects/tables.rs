//! Default parameter tables for the three effects.
//!
//! Each table is the default value of a configuration field, so any entry can
//! be overridden from a config file.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{simulation::Color, ParticleFxError, Result};

/// Closed numeric range `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub min: f32,
    pub max: f32,
}

impl Span {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Uniform real in `[min, max]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        rng.gen_range(self.min..=self.max)
    }

    /// Uniform integer in `[min, max]` (bounds rounded inward), as `f32`.
    pub fn sample_int<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let low = self.min.ceil() as i64;
        let high = (self.max.floor() as i64).max(low);
        rng.gen_range(low..=high) as f32
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Rejects inverted or non-finite bounds; `name` labels the error.
    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(ParticleFxError::config(format!(
                "{name} range is inverted or not finite: [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

pub const FIREWORK_PALETTE: [Color; 6] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
];

pub const LAUNCHER_COLOR: Color = [255, 255, 255];

/// Burst shape of one firework size class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShellClass {
    pub particle_count: usize,
    /// Launch speed of each spark, px/frame.
    pub speed: Span,
    /// Extra spark speed per unit of launch energy.
    pub energy_speed_gain: f32,
}

pub const SMALL_SHELL: ShellClass = ShellClass {
    particle_count: 60,
    speed: Span::new(2.0, 7.0),
    energy_speed_gain: 0.0,
};

pub const LARGE_SHELL: ShellClass = ShellClass {
    particle_count: 120,
    speed: Span::new(5.0, 10.0),
    energy_speed_gain: 0.0,
};

pub const CLASSIC_SHELL: ShellClass = ShellClass {
    particle_count: 80,
    speed: Span::new(2.0, 8.0),
    energy_speed_gain: 2.0,
};

/// One falling-rain style.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RainStyle {
    pub weight: f32,
    pub length: Span,
    pub speed: Span,
    pub thickness: u32,
}

pub const RAIN_STYLES: [RainStyle; 2] = [
    RainStyle {
        weight: 0.6,
        length: Span::new(8.0, 15.0),
        speed: Span::new(3.0, 6.0),
        thickness: 1,
    },
    RainStyle {
        weight: 0.4,
        length: Span::new(15.0, 30.0),
        speed: Span::new(7.0, 15.0),
        thickness: 2,
    },
];

pub const RAIN_COLOR: Color = [192, 192, 192];
pub const SPLASH_COLOR: Color = [180, 200, 255];

/// One depth layer of snowflakes, far to close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlakeLayer {
    pub size: Span,
    pub speed: Span,
    pub brightness: Span,
    /// Brightness lost per frame while falling.
    pub fade: f32,
}

pub const SNOW_LAYERS: [FlakeLayer; 4] = [
    FlakeLayer {
        size: Span::new(1.0, 2.0),
        speed: Span::new(0.8, 1.3),
        brightness: Span::new(10.0, 50.0),
        fade: 0.05,
    },
    FlakeLayer {
        size: Span::new(2.0, 6.0),
        speed: Span::new(1.6, 1.8),
        brightness: Span::new(50.0, 150.0),
        fade: 0.05,
    },
    FlakeLayer {
        size: Span::new(8.0, 12.0),
        speed: Span::new(1.8, 2.8),
        brightness: Span::new(150.0, 230.0),
        fade: 0.02,
    },
    FlakeLayer {
        size: Span::new(14.0, 20.0),
        speed: Span::new(3.0, 4.0),
        brightness: Span::new(220.0, 255.0),
        fade: 0.02,
    },
];

pub const SNOW_CALM_WEIGHTS: [f32; 4] = [0.2, 0.2, 0.25, 0.03];
pub const SNOW_STORM_WEIGHTS: [f32; 4] = [0.1, 0.15, 0.2, 0.05];
