//! Rain with ground splashes.
//!
//! The population of drops follows the smoothed loudness. Drops are never
//! removed by physics: a drop that reaches the ground line may leave a
//! splash and is moved back above the top edge.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    tables::{RainStyle, Span, RAIN_COLOR, RAIN_STYLES, SPLASH_COLOR},
    Effect, EffectKind,
};
use crate::{
    simulation::{Color, ParticleId, Ring, Sprite, SpriteKind, StepContext},
    BeatBurst, Categorical, Drive, DriveSignal, FeatureFrame, ParticleFxError, Result,
    SpawnRequest, SpawnSettings, SteadyPolicy,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplashParams {
    /// Splash probability is `base_probability + bass_bias * low_ratio`.
    pub base_probability: f32,
    pub bass_bias: f32,
    pub radius_base: f32,
    pub radius_gain: f32,
    pub max_radius_margin: f32,
    pub max_radius_gain: f32,
    pub growth: f32,
    pub alpha: f32,
    pub fade: f32,
    pub min_rings: u32,
    pub ring_gain: f32,
    /// Ring `i` is drawn at `radius * (ring_scale + i * ring_step)`.
    pub ring_scale: f32,
    pub ring_step: f32,
    pub ring_alpha_step: f32,
    pub color: Color,
}

impl Default for SplashParams {
    fn default() -> Self {
        Self {
            base_probability: 0.5,
            bass_bias: 0.5,
            radius_base: 4.0,
            radius_gain: 8.0,
            max_radius_margin: 20.0,
            max_radius_gain: 15.0,
            growth: 1.5,
            alpha: 220.0,
            fade: 4.0,
            min_rings: 2,
            ring_gain: 4.0,
            ring_scale: 0.6,
            ring_step: 0.25,
            ring_alpha_step: 30.0,
            color: SPLASH_COLOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainParams {
    pub styles: Vec<RainStyle>,
    /// Distance of the ground line above the bottom edge.
    pub ground_offset: f32,
    /// Where recycled drops re-enter, relative to the top edge.
    pub reentry: Span,
    /// Fall speed is multiplied by `1 + speed_energy_gain * smoothed`.
    pub speed_energy_gain: f32,
    /// Horizontal spread is `width * (spread_base + spread_gain * (1 - low_ratio))`.
    pub spread_base: f32,
    pub spread_gain: f32,
    pub ratio_epsilon: f32,
    pub color: Color,
    pub splash: SplashParams,
}

impl Default for RainParams {
    fn default() -> Self {
        Self {
            styles: RAIN_STYLES.to_vec(),
            ground_offset: 60.0,
            reentry: Span::new(-30.0, 0.0),
            speed_energy_gain: 1.5,
            spread_base: 0.2,
            spread_gain: 0.5,
            ratio_epsilon: 1e-6,
            color: RAIN_COLOR,
            splash: SplashParams::default(),
        }
    }
}

impl RainParams {
    /// Checks styles, ranges and the splash fade.
    pub fn validate(&self) -> Result<()> {
        if self.styles.is_empty() {
            return Err(ParticleFxError::config("rain needs at least one style"));
        }
        for style in &self.styles {
            style.length.validate("rain length")?;
            style.speed.validate("rain speed")?;
        }
        self.reentry.validate("rain reentry")?;
        if !(self.ratio_epsilon > 0.0) {
            return Err(ParticleFxError::config("ratio_epsilon must be positive"));
        }
        if !(self.splash.fade > 0.0) {
            return Err(ParticleFxError::config("splash fade must be positive"));
        }
        Ok(())
    }

    fn style_weights(&self) -> Vec<f32> {
        self.styles.iter().map(|style| style.weight).collect()
    }

    /// Horizontal range drops are drawn from for the given band balance.
    /// Bass-heavy moments gather the rain toward the middle.
    pub fn drop_zone(&self, low_ratio: f32, width: f32) -> Span {
        let center = (width * 0.5).floor();
        let spread = (width * (self.spread_base + self.spread_gain * (1.0 - low_ratio))).floor();
        Span::new((center - spread).max(0.0), (center + spread).min(width))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainConfig {
    pub drive: DriveSignal,
    pub spawn: SpawnSettings,
    pub params: RainParams,
}

impl Default for RainConfig {
    fn default() -> Self {
        Self {
            drive: DriveSignal::broadband(),
            spawn: SpawnSettings {
                steady: SteadyPolicy::TargetCount {
                    smoothing: 0.9,
                    min: 20,
                    max: 250,
                },
                burst: Some(BeatBurst::default()),
                surge: None,
            },
            params: RainParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Raindrop {
    pub id: ParticleId,
    pub position: Vec2,
    pub speed: f32,
    pub length: f32,
    pub thickness: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Splash {
    pub id: ParticleId,
    pub position: Vec2,
    pub radius: f32,
    pub max_radius: f32,
    pub growth: f32,
    pub alpha: f32,
    pub rings: u32,
}

impl Splash {
    /// Bass-heavy, loud moments make wider splashes with more rings.
    pub fn new<R: Rng + ?Sized>(
        id: ParticleId,
        position: Vec2,
        low_ratio: f32,
        energy: f32,
        params: &SplashParams,
        rng: &mut R,
    ) -> Self {
        let weight = (low_ratio * energy).min(1.0).max(0.0);
        let radius = params.radius_base + (params.radius_gain * weight).floor();
        let max_radius = (radius + params.max_radius_margin + params.max_radius_gain * weight).floor();
        let most_rings = ((params.ring_gain * low_ratio).floor().max(0.0) as u32).max(params.min_rings);
        Self {
            id,
            position,
            radius,
            max_radius,
            growth: params.growth,
            alpha: params.alpha,
            rings: rng.gen_range(params.min_rings..=most_rings),
        }
    }

    pub fn advance(&mut self, params: &SplashParams) {
        self.radius += self.growth;
        self.alpha = (self.alpha - params.fade).max(0.0);
    }

    pub fn is_dead(&self) -> bool {
        self.alpha <= 0.0
    }

    /// Visible rings, innermost first. Rings that outgrew the splash are
    /// skipped.
    pub fn ring_geometry(&self, params: &SplashParams) -> Vec<Ring> {
        (0..self.rings)
            .filter_map(|i| {
                let radius = (self.radius * (params.ring_scale + i as f32 * params.ring_step)).floor();
                (radius < self.max_radius).then(|| Ring {
                    radius,
                    alpha: (self.alpha - i as f32 * params.ring_alpha_step).max(0.0),
                })
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct RainField {
    params: RainParams,
    styles: Categorical,
    drops: Vec<Raindrop>,
    splashes: Vec<Splash>,
}

impl RainField {
    /// Empty field. Drops only appear through [`Effect::spawn`].
    pub fn new(params: RainParams) -> Result<Self> {
        params.validate()?;
        let styles = Categorical::new(&params.style_weights())?;
        Ok(Self {
            params,
            styles,
            drops: Vec::new(),
            splashes: Vec::new(),
        })
    }

    pub fn params(&self) -> &RainParams {
        &self.params
    }

    pub fn drops(&self) -> &[Raindrop] {
        &self.drops
    }

    #[cfg(test)]
    pub(crate) fn drops_mut(&mut self) -> &mut [Raindrop] {
        &mut self.drops
    }

    pub fn splashes(&self) -> &[Splash] {
        &self.splashes
    }

    fn ground_y(&self, ctx: &StepContext<'_>) -> f32 {
        ctx.bounds.height_f() - self.params.ground_offset
    }

    fn drop_x(&self, frame: &FeatureFrame, ctx: &mut StepContext<'_>) -> f32 {
        let low_ratio = frame.low_ratio(self.params.ratio_epsilon);
        self.params
            .drop_zone(low_ratio, ctx.bounds.width_f())
            .sample_int(ctx.rng)
    }

    fn add_drop(&mut self, frame: &FeatureFrame, ctx: &mut StepContext<'_>) {
        let style = self.params.styles[self.styles.sample(ctx.rng)];
        let x = self.drop_x(frame, ctx);
        let y = Span::new(-ctx.bounds.height_f(), 0.0).sample_int(ctx.rng);
        self.drops.push(Raindrop {
            id: ctx.ids.next_id(),
            position: Vec2::new(x, y),
            speed: style.speed.sample(ctx.rng),
            length: style.length.sample_int(ctx.rng),
            thickness: style.thickness,
        });
    }
}

impl Effect for RainField {
    fn kind(&self) -> EffectKind {
        EffectKind::Rain
    }

    fn live_count(&self) -> usize {
        self.drops.len()
    }

    fn spawn(
        &mut self,
        _request: &SpawnRequest,
        frame: &FeatureFrame,
        _drive: &Drive,
        ctx: &mut StepContext<'_>,
    ) {
        self.add_drop(frame, ctx);
    }

    /// Keeps the `target` longest-lived drops and discards the newest.
    fn cull_to(&mut self, target: usize) {
        self.drops.truncate(target);
    }

    fn advance(&mut self, frame: &FeatureFrame, drive: &Drive, ctx: &mut StepContext<'_>) {
        let ground = self.ground_y(ctx);
        let low_ratio = frame.low_ratio(self.params.ratio_epsilon);
        let fall_scale = 1.0 + drive.smoothed * self.params.speed_energy_gain;
        let splash_odds = self.params.splash.base_probability + self.params.splash.bass_bias * low_ratio;
        let zone = self.params.drop_zone(low_ratio, ctx.bounds.width_f());

        for drop in &mut self.drops {
            drop.position.y += drop.speed * fall_scale;
            if drop.position.y < ground {
                continue;
            }

            if ctx.rng.gen::<f32>() < splash_odds {
                self.splashes.push(Splash::new(
                    ctx.ids.next_id(),
                    Vec2::new(drop.position.x, ground),
                    low_ratio,
                    drive.smoothed,
                    &self.params.splash,
                    ctx.rng,
                ));
            }
            drop.position.y = self.params.reentry.sample_int(ctx.rng);
            drop.position.x = zone.sample_int(ctx.rng);
        }

        for splash in &mut self.splashes {
            splash.advance(&self.params.splash);
        }
        self.splashes.retain(|splash| !splash.is_dead());
    }

    fn collect_sprites(&self, sprites: &mut Vec<Sprite>) {
        sprites.extend(self.drops.iter().map(|drop| Sprite {
            id: drop.id,
            position: drop.position,
            size: drop.thickness as f32,
            color: self.params.color,
            kind: SpriteKind::Raindrop {
                length: drop.length,
                thickness: drop.thickness,
            },
        }));
        sprites.extend(self.splashes.iter().map(|splash| Sprite {
            id: splash.id,
            position: splash.position,
            size: splash.radius,
            color: self.params.splash.color,
            kind: SpriteKind::Splash {
                max_radius: splash.max_radius,
                rings: splash.ring_geometry(&self.params.splash),
                alpha: splash.alpha,
            },
        }));
    }
}
