//! The per-run simulation context.
//!
//! [`ParticleSimulation`] owns everything that changes while a track plays:
//! the active effect (and through it every live particle and the snow
//! surface), the spawn controller, the random generator and the id
//! allocator. Nothing here is process-global; callers hold the context and
//! feed it one [`FeatureFrame`] per rendered frame.

mod particle;
mod surface;

pub use particle::{Color, IdAllocator, Kinematics, Particle, ParticleId};
pub use surface::AccumulationSurface;

use glam::Vec2;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    effects::{self, Effect, EffectKind},
    AppConfig, DriveSignal, FeatureFrame, ParticleFxError, Result, SpawnController,
    SpawnSettings,
};

/// Screen size the effects simulate within, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ParticleFxError::config(format!(
                "screen dimensions must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width_f(&self) -> f32 {
        self.width as f32
    }

    pub fn height_f(&self) -> f32 {
        self.height as f32
    }
}

/// Mutable state an effect borrows while it spawns and advances.
pub struct StepContext<'a> {
    pub rng: &'a mut StdRng,
    pub ids: &'a mut IdAllocator,
    pub bounds: Bounds,
}

/// A single drawable thing in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprite {
    pub id: ParticleId,
    pub position: Vec2,
    pub size: f32,
    pub color: Color,
    pub kind: SpriteKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpriteKind {
    Launcher,
    Spark {
        remaining_life: u32,
    },
    Raindrop {
        length: f32,
        thickness: u32,
    },
    Splash {
        max_radius: f32,
        rings: Vec<Ring>,
        alpha: f32,
    },
    Snowflake {
        brightness: f32,
        angle: f32,
        fixed: bool,
    },
}

/// One ring of a splash, already scaled for drawing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    pub radius: f32,
    pub alpha: f32,
}

/// Everything a renderer needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub frame: u64,
    pub effect: EffectKind,
    pub sprites: Vec<Sprite>,
    /// Snow depth per screen column, for effects that accumulate.
    pub surface: Option<Vec<f32>>,
}

pub struct ParticleSimulation {
    effect: Box<dyn Effect>,
    spawner: SpawnController,
    drive: DriveSignal,
    rng: StdRng,
    ids: IdAllocator,
    bounds: Bounds,
    frame: u64,
}

impl ParticleSimulation {
    /// Builds the effect named by `config`. `seed` fixes the random stream;
    /// without one the generator is seeded from the OS.
    pub fn from_config(config: &AppConfig, seed: Option<u64>) -> Result<Self> {
        config.validate()?;
        let bounds = Bounds::new(config.render.width, config.render.height)?;
        let (effect, spawn, drive) = effects::build(&config.effect, bounds)?;
        let rng = match seed.or(config.seed) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_effect(effect, spawn, drive, bounds, rng)
    }

    pub fn with_effect(
        effect: Box<dyn Effect>,
        spawn: SpawnSettings,
        drive: DriveSignal,
        bounds: Bounds,
        rng: StdRng,
    ) -> Result<Self> {
        let spawner = SpawnController::new(spawn)?;
        tracing::debug!(effect = ?effect.kind(), ?bounds, "simulation ready");
        Ok(Self {
            effect,
            spawner,
            drive,
            rng,
            ids: IdAllocator::default(),
            bounds,
            frame: 0,
        })
    }

    pub fn kind(&self) -> EffectKind {
        self.effect.kind()
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Frames stepped so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn live_count(&self) -> usize {
        self.effect.live_count()
    }

    pub fn surface(&self) -> Option<&AccumulationSurface> {
        self.effect.surface()
    }

    pub fn spawner(&self) -> &SpawnController {
        &self.spawner
    }

    /// Advances the simulation by one frame and returns what to draw.
    pub fn step(&mut self, features: &FeatureFrame) -> Snapshot {
        self.advance(features);
        self.snapshot()
    }

    /// Advances by one frame without building a snapshot.
    pub fn advance(&mut self, features: &FeatureFrame) {
        let energy = self.drive.evaluate(features);
        let decision = self
            .spawner
            .decide(energy, self.effect.live_count(), &mut self.rng);

        let mut ctx = StepContext {
            rng: &mut self.rng,
            ids: &mut self.ids,
            bounds: self.bounds,
        };

        if let Some(target) = decision.cull_to {
            self.effect.cull_to(target);
        }
        for request in &decision.requests {
            self.effect
                .spawn(request, features, &decision.drive, &mut ctx);
        }
        if decision.burst_fired {
            tracing::trace!(frame = self.frame, energy, "beat burst");
        }

        self.effect.advance(features, &decision.drive, &mut ctx);
        self.frame += 1;
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut sprites = Vec::with_capacity(self.effect.live_count());
        self.effect.collect_sprites(&mut sprites);
        Snapshot {
            frame: self.frame,
            effect: self.effect.kind(),
            sprites,
            surface: self.effect.surface().map(|s| s.heights().to_vec()),
        }
    }
}

impl std::fmt::Debug for ParticleSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleSimulation")
            .field("effect", &self.effect.kind())
            .field("spawner", &self.spawner)
            .field("bounds", &self.bounds)
            .field("frame", &self.frame)
            .field("live", &self.effect.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn config(kind: EffectKind) -> AppConfig {
        let mut config = AppConfig::preset(kind);
        config.render.width = 640;
        config.render.height = 480;
        config
    }

    fn loud() -> FeatureFrame {
        FeatureFrame {
            broadband_energy: 6.0,
            low_band_energy: 4_000.0,
            high_band_energy: 0.97,
        }
    }

    #[test]
    fn rejects_zero_dimensions() {
        let mut config = config(EffectKind::Firework);
        config.render.width = 0;
        assert!(ParticleSimulation::from_config(&config, Some(1)).is_err());
    }

    #[test]
    fn same_seed_same_snapshots() {
        for kind in [EffectKind::Firework, EffectKind::Rain, EffectKind::Snow] {
            let config = config(kind);
            let mut a = ParticleSimulation::from_config(&config, Some(42)).unwrap();
            let mut b = ParticleSimulation::from_config(&config, Some(42)).unwrap();
            for _ in 0..120 {
                assert_eq!(a.step(&loud()), b.step(&loud()));
            }
        }
    }

    #[test]
    fn removed_ids_never_reappear() {
        let config = config(EffectKind::Firework);
        let mut sim = ParticleSimulation::from_config(&config, Some(7)).unwrap();

        let mut seen: HashSet<ParticleId> = HashSet::new();
        let mut removed: HashSet<ParticleId> = HashSet::new();
        let mut previous: HashSet<ParticleId> = HashSet::new();

        for frame in 0..600 {
            let features = if frame < 200 { loud() } else { FeatureFrame::SILENT };
            let snapshot = sim.step(&features);
            let current: HashSet<ParticleId> = snapshot.sprites.iter().map(|s| s.id).collect();

            assert!(current.is_disjoint(&removed), "frame {frame}");
            removed.extend(previous.difference(&current).copied());
            seen.extend(current.iter().copied());
            previous = current;
        }

        assert!(!seen.is_empty());
        assert_eq!(sim.live_count(), 0);
    }

    #[test]
    fn classic_firework_preset_launches_under_load() {
        let mut config = AppConfig::firework_classic();
        config.render.width = 640;
        config.render.height = 480;
        let mut sim = ParticleSimulation::from_config(&config, Some(11)).unwrap();

        let launchers = (0..120)
            .map(|_| sim.step(&loud()))
            .flat_map(|snapshot| snapshot.sprites)
            .filter(|sprite| matches!(sprite.kind, SpriteKind::Launcher))
            .count();
        assert!(launchers > 0);
    }

    #[test]
    fn snapshots_carry_surface_only_for_snow() {
        let mut snow = ParticleSimulation::from_config(&config(EffectKind::Snow), Some(3)).unwrap();
        let snapshot = snow.step(&loud());
        assert_eq!(snapshot.surface.as_ref().map(Vec::len), Some(640));

        let mut rain = ParticleSimulation::from_config(&config(EffectKind::Rain), Some(3)).unwrap();
        assert!(rain.step(&loud()).surface.is_none());
    }
}
