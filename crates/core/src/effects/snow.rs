//! Snowfall that piles up on the ground.
//!
//! Falling flakes drift, wrap around the side edges and settle on the
//! [`AccumulationSurface`]. A settled flake is frozen where it landed and
//! raises its column by its own size, so later flakes settle on top of it.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    tables::{FlakeLayer, Span, SNOW_CALM_WEIGHTS, SNOW_LAYERS, SNOW_STORM_WEIGHTS},
    Effect, EffectKind,
};
use crate::{
    simulation::{AccumulationSurface, Bounds, Particle, Sprite, SpriteKind, StepContext},
    Categorical, Drive, DriveSignal, FeatureFrame, ParticleFxError, Result, SpawnRequest,
    SpawnSettings, SteadyPolicy, Surge, Tier,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowParams {
    /// Depth layers, far to close.
    pub layers: Vec<FlakeLayer>,
    pub calm_weights: Vec<f32>,
    /// Layer weights used while the high band is above `storm_threshold`.
    pub storm_weights: Vec<f32>,
    pub storm_threshold: f32,
    /// Fall speed is multiplied by `1 + speed_gain * high_band`.
    pub speed_gain: f32,
    /// Bounds of the sideways drift, px/frame.
    pub drift: Span,
    /// Largest change of the drift per frame.
    pub drift_step: f32,
    /// New flakes start up to `spawn_depth * height` above the top edge.
    pub spawn_depth: f32,
    pub brightness_floor: f32,
    /// Frames a flake may spend falling before it is dropped.
    pub lifetime: u32,
}

impl Default for SnowParams {
    fn default() -> Self {
        Self {
            layers: SNOW_LAYERS.to_vec(),
            calm_weights: SNOW_CALM_WEIGHTS.to_vec(),
            storm_weights: SNOW_STORM_WEIGHTS.to_vec(),
            storm_threshold: 0.95,
            speed_gain: 0.2,
            drift: Span::new(-0.05, 0.05),
            drift_step: 0.005,
            spawn_depth: 0.5,
            brightness_floor: 100.0,
            lifetime: 36_000,
        }
    }
}

impl SnowParams {
    /// Checks the layer tables, weights, drift and spawn depth.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(ParticleFxError::config("snow needs at least one layer"));
        }
        if self.calm_weights.len() != self.layers.len()
            || self.storm_weights.len() != self.layers.len()
        {
            return Err(ParticleFxError::config(format!(
                "snow weights must have one entry per layer ({})",
                self.layers.len()
            )));
        }
        for layer in &self.layers {
            layer.size.validate("flake size")?;
            layer.speed.validate("flake speed")?;
            layer.brightness.validate("flake brightness")?;
        }
        self.drift.validate("flake drift")?;
        if !self.drift_step.is_finite() || self.drift_step < 0.0 {
            return Err(ParticleFxError::config(format!(
                "drift_step must be finite and non-negative, got {}",
                self.drift_step
            )));
        }
        if !(0.0..=1.0).contains(&self.spawn_depth) {
            return Err(ParticleFxError::config("spawn_depth must lie in [0, 1]"));
        }
        if self.lifetime == 0 {
            return Err(ParticleFxError::config("flake lifetime must be non-zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowConfig {
    pub drive: DriveSignal,
    pub spawn: SpawnSettings,
    pub params: SnowParams,
}

impl Default for SnowConfig {
    fn default() -> Self {
        let params = SnowParams::default();
        let closest = params.layers.len() - 1;
        Self {
            drive: DriveSignal::high_band(),
            spawn: SpawnSettings {
                steady: SteadyPolicy::PerFrame { min: 1, gain: 0.05 },
                burst: None,
                surge: Some(Surge {
                    threshold: 0.95,
                    probability: 0.001,
                    tier: Tier::Layer(closest),
                }),
            },
            params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlakeState {
    Falling,
    /// Settled on the surface in `column`. Terminal.
    Fixed { column: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snowflake {
    pub particle: Particle,
    pub layer: usize,
    pub base_speed: f32,
    pub drift: f32,
    pub angle: f32,
    pub brightness: f32,
    pub fade: f32,
    pub state: FlakeState,
}

impl Snowflake {
    pub fn is_fixed(&self) -> bool {
        matches!(self.state, FlakeState::Fixed { .. })
    }

    fn fall<R: Rng + ?Sized>(
        &mut self,
        high_band: f32,
        params: &SnowParams,
        bounds: Bounds,
        rng: &mut R,
    ) {
        let p = &mut self.particle;
        p.velocity = Vec2::new(self.drift, self.base_speed * (1.0 + params.speed_gain * high_band));
        p.position += p.velocity;
        p.remaining_life = p.remaining_life.saturating_sub(1);

        self.drift = (self.drift + rng.gen_range(-params.drift_step..=params.drift_step))
            .clamp(params.drift.min, params.drift.max);

        let width = bounds.width_f();
        if p.position.x < 0.0 {
            p.position.x = width - 1.0;
        } else if p.position.x >= width {
            p.position.x = 0.0;
        }
    }

    /// Freezes the flake if it reached the snow line; returns whether it did.
    fn settle(&mut self, surface: &mut AccumulationSurface, screen_height: f32) -> bool {
        let column = surface.column(self.particle.position.x);
        let contact = surface.contact_y(column, screen_height);
        if self.particle.position.y < contact {
            return false;
        }

        let size = self.particle.size;
        self.particle.position.y = contact - (size / 2.0).floor();
        self.particle.velocity = Vec2::ZERO;
        surface.deposit(column, size);
        self.state = FlakeState::Fixed { column };
        true
    }

    fn fade(&mut self, floor: f32) {
        if self.brightness > floor {
            self.brightness = (self.brightness - self.fade).max(floor);
        }
    }
}

#[derive(Debug)]
pub struct Snowfall {
    params: SnowParams,
    calm: Categorical,
    storm: Categorical,
    surface: AccumulationSurface,
    falling: Vec<Snowflake>,
    fixed: Vec<Snowflake>,
}

impl Snowfall {
    /// Empty sky over bare ground `bounds.width` columns wide.
    pub fn new(params: SnowParams, bounds: Bounds) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            calm: Categorical::new(&params.calm_weights)?,
            storm: Categorical::new(&params.storm_weights)?,
            surface: AccumulationSurface::new(bounds.width as usize),
            params,
            falling: Vec::new(),
            fixed: Vec::new(),
        })
    }

    pub fn params(&self) -> &SnowParams {
        &self.params
    }

    pub fn falling(&self) -> &[Snowflake] {
        &self.falling
    }

    pub fn fixed(&self) -> &[Snowflake] {
        &self.fixed
    }

    fn pick_layer<R: Rng + ?Sized>(&self, tier: Tier, high_band: f32, rng: &mut R) -> usize {
        let last = self.params.layers.len() - 1;
        match tier {
            Tier::Layer(layer) => layer.min(last),
            Tier::Small => 0,
            Tier::Large => last,
            Tier::Default if high_band > self.params.storm_threshold => self.storm.sample(rng),
            Tier::Default => self.calm.sample(rng),
        }
    }

    fn make_flake(&self, layer: usize, ctx: &mut StepContext<'_>) -> Snowflake {
        let table = self.params.layers[layer];
        let x = Span::new(0.0, ctx.bounds.width_f() - 1.0).sample_int(ctx.rng);
        let y = Span::new(-(ctx.bounds.height_f() * self.params.spawn_depth).floor(), 0.0)
            .sample_int(ctx.rng);
        Snowflake {
            particle: Particle {
                id: ctx.ids.next_id(),
                position: Vec2::new(x, y),
                velocity: Vec2::ZERO,
                color: [255, 255, 255],
                remaining_life: self.params.lifetime,
                size: table.size.sample_int(ctx.rng),
            },
            layer,
            base_speed: table.speed.sample(ctx.rng),
            drift: self.params.drift.sample(ctx.rng),
            angle: ctx.rng.gen_range(0.0..360.0),
            brightness: table.brightness.sample_int(ctx.rng),
            fade: table.fade,
            state: FlakeState::Falling,
        }
    }
}

impl Effect for Snowfall {
    fn kind(&self) -> EffectKind {
        EffectKind::Snow
    }

    fn live_count(&self) -> usize {
        self.falling.len()
    }

    fn spawn(
        &mut self,
        request: &SpawnRequest,
        frame: &FeatureFrame,
        _drive: &Drive,
        ctx: &mut StepContext<'_>,
    ) {
        let layer = self.pick_layer(request.tier, frame.high_band_energy, ctx.rng);
        let flake = self.make_flake(layer, ctx);
        self.falling.push(flake);
    }

    fn cull_to(&mut self, target: usize) {
        if self.falling.len() > target {
            let excess = self.falling.len() - target;
            self.falling.drain(..excess);
        }
    }

    fn advance(&mut self, frame: &FeatureFrame, _drive: &Drive, ctx: &mut StepContext<'_>) {
        let screen_height = ctx.bounds.height_f();
        let high_band = frame.high_band_energy;
        let falling = std::mem::take(&mut self.falling);
        let mut settled = 0_usize;

        for mut flake in falling {
            flake.fall(high_band, &self.params, ctx.bounds, ctx.rng);
            if flake.settle(&mut self.surface, screen_height) {
                settled += 1;
                self.fixed.push(flake);
                continue;
            }
            flake.fade(self.params.brightness_floor);
            if flake.particle.remaining_life > 0 {
                self.falling.push(flake);
            }
        }

        if settled > 0 {
            tracing::trace!(settled, depth = self.surface.total_depth(), "flakes settled");
        }
    }

    fn collect_sprites(&self, sprites: &mut Vec<Sprite>) {
        sprites.extend(self.fixed.iter().chain(&self.falling).map(|flake| {
            let level = flake.brightness.round().clamp(0.0, 255.0) as u8;
            Sprite {
                id: flake.particle.id,
                position: flake.particle.position,
                size: flake.particle.size,
                color: [level; 3],
                kind: SpriteKind::Snowflake {
                    brightness: flake.brightness,
                    angle: flake.angle,
                    fixed: flake.is_fixed(),
                },
            }
        }));
    }

    fn surface(&self) -> Option<&AccumulationSurface> {
        Some(&self.surface)
    }
}
