//! Fireworks: launchers rise from the bottom edge and burst into sparks.

use std::f32::consts::TAU;

use glam::Vec2;
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use super::{
    tables::{ShellClass, Span, CLASSIC_SHELL, FIREWORK_PALETTE, LARGE_SHELL, LAUNCHER_COLOR, SMALL_SHELL},
    Effect, EffectKind,
};
use crate::{
    simulation::{Color, Kinematics, Particle, ParticleId, Sprite, SpriteKind, StepContext},
    Drive, DriveSignal, FeatureFrame, ParticleFxError, Result, SpawnRequest, SpawnSettings,
    SteadyPolicy, Tier,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireworkParams {
    /// Base rise speed in px/frame.
    pub rise_speed: f32,
    /// Extra rise speed per unit of launch energy.
    pub rise_energy_gain: f32,
    /// Launchers start at least this far from either side of the screen.
    pub launch_margin: f32,
    /// Screen y at which a launcher bursts.
    pub apex: Span,
    /// Spark lifetime is drawn from this integer range, then scaled.
    pub lifetime: Span,
    pub lifetime_scale: f32,
    /// Spark size is `(size_base + size_energy_gain * energy) * size_scale`.
    pub size_base: f32,
    pub size_energy_gain: f32,
    pub size_scale: f32,
    pub kinematics: Kinematics,
    pub small: ShellClass,
    pub large: ShellClass,
    pub classic: ShellClass,
    pub palette: Vec<Color>,
    pub launcher_color: Color,
}

impl Default for FireworkParams {
    fn default() -> Self {
        Self {
            rise_speed: 10.0,
            rise_energy_gain: 5.0,
            launch_margin: 200.0,
            apex: Span::new(400.0, 800.0),
            lifetime: Span::new(40.0, 80.0),
            lifetime_scale: 1.2,
            size_base: 2.0,
            size_energy_gain: 3.0,
            size_scale: 0.6,
            kinematics: Kinematics::default(),
            small: SMALL_SHELL,
            large: LARGE_SHELL,
            classic: CLASSIC_SHELL,
            palette: FIREWORK_PALETTE.to_vec(),
            launcher_color: LAUNCHER_COLOR,
        }
    }
}

impl FireworkParams {
    /// Checks every range and that sparks live at least one frame.
    pub fn validate(&self) -> Result<()> {
        self.apex.validate("apex")?;
        self.lifetime.validate("lifetime")?;
        for (name, class) in [
            ("small", &self.small),
            ("large", &self.large),
            ("classic", &self.classic),
        ] {
            class.speed.validate(name)?;
        }
        if self.lifetime.min * self.lifetime_scale < 1.0 {
            return Err(ParticleFxError::config("spark lifetime must be at least one frame"));
        }
        if self.palette.is_empty() {
            return Err(ParticleFxError::config("firework palette must not be empty"));
        }
        if !(self.kinematics.shrink > 0.0) {
            return Err(ParticleFxError::config("shrink factor must be positive"));
        }
        Ok(())
    }

    pub fn class(&self, kind: ShellKind) -> &ShellClass {
        match kind {
            ShellKind::Small => &self.small,
            ShellKind::Large => &self.large,
            ShellKind::Classic => &self.classic,
        }
    }

    /// Inclusive range of spark lifetimes in frames.
    pub fn lifetime_bounds(&self) -> (u32, u32) {
        let low = (self.lifetime.min.ceil() * self.lifetime_scale) as u32;
        let high = (self.lifetime.max.floor() * self.lifetime_scale) as u32;
        (low, high)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireworkConfig {
    pub drive: DriveSignal,
    pub spawn: SpawnSettings,
    pub params: FireworkParams,
}

impl Default for FireworkConfig {
    /// Energy tiers: large shells on loud frames, small ones otherwise.
    fn default() -> Self {
        Self {
            drive: DriveSignal::broadband(),
            spawn: SpawnSettings {
                steady: SteadyPolicy::ThresholdTiered {
                    large: 5.0,
                    small: 1.0,
                    max_live: 30,
                },
                burst: None,
                surge: None,
            },
            params: FireworkParams::default(),
        }
    }
}

impl FireworkConfig {
    /// Random launches whose odds rise with energy, all of the classic class.
    pub fn gated() -> Self {
        Self {
            spawn: SpawnSettings {
                steady: SteadyPolicy::ProbabilityGated {
                    base: 0.05,
                    divisor: 50.0,
                    max: 0.2,
                },
                burst: None,
                surge: None,
            },
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellKind {
    Small,
    Large,
    Classic,
}

impl From<Tier> for ShellKind {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Small => ShellKind::Small,
            Tier::Large => ShellKind::Large,
            Tier::Default | Tier::Layer(_) => ShellKind::Classic,
        }
    }
}

/// A rising shell before it bursts.
#[derive(Debug, Clone, PartialEq)]
pub struct Launcher {
    pub id: ParticleId,
    pub position: Vec2,
    pub apex: f32,
    pub energy: f32,
    pub kind: ShellKind,
}

impl Launcher {
    /// Moves up one frame. Returns true once the apex is reached.
    pub fn rise(&mut self, params: &FireworkParams) -> bool {
        self.position.y -= params.rise_speed + self.energy * params.rise_energy_gain;
        self.position.y <= self.apex
    }

    /// Consumes the launcher and returns its sparks.
    pub fn explode(self, params: &FireworkParams, ctx: &mut StepContext<'_>) -> Vec<Particle> {
        let class = params.class(self.kind);
        let size = (params.size_base + self.energy * params.size_energy_gain) * params.size_scale;
        let speed_bonus = class.energy_speed_gain * self.energy;

        tracing::debug!(
            launcher = self.id.0,
            kind = ?self.kind,
            sparks = class.particle_count,
            y = self.position.y,
            "shell burst"
        );

        (0..class.particle_count)
            .map(|_| {
                let angle = ctx.rng.gen_range(0.0..TAU);
                let speed = class.speed.sample(ctx.rng) + speed_bonus;
                let color = params
                    .palette
                    .choose(ctx.rng)
                    .copied()
                    .unwrap_or(params.launcher_color);
                let lifetime = (params.lifetime.sample_int(ctx.rng) * params.lifetime_scale) as u32;
                Particle {
                    id: ctx.ids.next_id(),
                    position: self.position,
                    velocity: Vec2::new(angle.cos(), angle.sin()) * speed,
                    color,
                    remaining_life: lifetime.max(1),
                    size,
                }
            })
            .collect()
    }

    /// Drawn size of the rising shell; louder shells look bigger.
    pub fn visual_size(&self) -> f32 {
        (4.0 * self.energy * 0.6).floor().max(3.0)
    }
}

/// A firework, either still rising or already burst. A burst shell is
/// finished once its last spark is gone.
#[derive(Debug, Clone, PartialEq)]
pub enum Shell {
    Rising(Launcher),
    Burst(Vec<Particle>),
}

impl Shell {
    /// Rises or bursts a launcher, or moves and prunes the sparks.
    pub fn advance(&mut self, params: &FireworkParams, ctx: &mut StepContext<'_>) {
        match self {
            Shell::Rising(launcher) => {
                if launcher.rise(params) {
                    let launcher = launcher.clone();
                    *self = Shell::Burst(launcher.explode(params, ctx));
                }
            }
            Shell::Burst(sparks) => {
                let kinematics = &params.kinematics;
                for spark in sparks.iter_mut() {
                    spark.advance(kinematics);
                }
                sparks.retain(|spark| !spark.is_spent(kinematics.min_size));
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Shell::Burst(sparks) if sparks.is_empty())
    }

    pub fn has_burst(&self) -> bool {
        matches!(self, Shell::Burst(_))
    }
}

#[derive(Debug)]
pub struct FireworkShow {
    params: FireworkParams,
    shells: Vec<Shell>,
}

impl FireworkShow {
    pub fn new(params: FireworkParams) -> Self {
        Self {
            params,
            shells: Vec::new(),
        }
    }

    pub fn shells(&self) -> &[Shell] {
        &self.shells
    }

    /// Sends up a shell of `kind` from a random point along the bottom edge.
    pub fn launch(&mut self, kind: ShellKind, energy: f32, ctx: &mut StepContext<'_>) {
        let width = ctx.bounds.width_f();
        let margin = self.params.launch_margin.clamp(0.0, width * 0.5);
        let x = Span::new(margin, width - margin).sample_int(ctx.rng);
        let apex = self.params.apex.sample_int(ctx.rng);

        self.shells.push(Shell::Rising(Launcher {
            id: ctx.ids.next_id(),
            position: Vec2::new(x, ctx.bounds.height_f()),
            apex,
            energy,
            kind,
        }));
    }
}

impl Effect for FireworkShow {
    fn kind(&self) -> EffectKind {
        EffectKind::Firework
    }

    fn live_count(&self) -> usize {
        self.shells.len()
    }

    fn spawn(
        &mut self,
        request: &SpawnRequest,
        _frame: &FeatureFrame,
        drive: &Drive,
        ctx: &mut StepContext<'_>,
    ) {
        self.launch(ShellKind::from(request.tier), drive.energy, ctx);
    }

    fn cull_to(&mut self, target: usize) {
        if self.shells.len() > target {
            let excess = self.shells.len() - target;
            self.shells.drain(..excess);
        }
    }

    fn advance(&mut self, _frame: &FeatureFrame, _drive: &Drive, ctx: &mut StepContext<'_>) {
        for shell in &mut self.shells {
            shell.advance(&self.params, ctx);
        }
        self.shells.retain(|shell| !shell.is_finished());
    }

    fn collect_sprites(&self, sprites: &mut Vec<Sprite>) {
        for shell in &self.shells {
            match shell {
                Shell::Rising(launcher) => sprites.push(Sprite {
                    id: launcher.id,
                    position: launcher.position,
                    size: launcher.visual_size(),
                    color: self.params.launcher_color,
                    kind: SpriteKind::Launcher,
                }),
                Shell::Burst(sparks) => sprites.extend(sparks.iter().map(|spark| Sprite {
                    id: spark.id,
                    position: spark.position,
                    size: spark.size,
                    color: spark.color,
                    kind: SpriteKind::Spark {
                        remaining_life: spark.remaining_life,
                    },
                })),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        simulation::{Bounds, IdAllocator},
        SpawnController,
    };

    struct Harness {
        rng: StdRng,
        ids: IdAllocator,
        bounds: Bounds,
    }

    impl Harness {
        fn new(seed: u64) -> Self {
            Self {
                rng: StdRng::seed_from_u64(seed),
                ids: IdAllocator::default(),
                bounds: Bounds::new(1920, 1080).unwrap(),
            }
        }

        fn ctx(&mut self) -> StepContext<'_> {
            StepContext {
                rng: &mut self.rng,
                ids: &mut self.ids,
                bounds: self.bounds,
            }
        }
    }

    fn launcher(kind: ShellKind, apex: f32, energy: f32) -> Launcher {
        Launcher {
            id: ParticleId(999),
            position: Vec2::new(960.0, 1080.0),
            apex,
            energy,
            kind,
        }
    }

    #[test]
    fn launcher_bursts_exactly_once_at_apex() {
        let params = FireworkParams::default();
        let mut harness = Harness::new(1);
        // Rise speed is 10 + 5 * 2 = 20 px/frame: 1080 -> 600 takes 24 frames.
        let mut shell = Shell::Rising(launcher(ShellKind::Large, 600.0, 2.0));

        let mut burst_frame = None;
        for frame in 1..=200 {
            let was_rising = !shell.has_burst();
            shell.advance(&params, &mut harness.ctx());
            if was_rising && shell.has_burst() {
                assert!(burst_frame.is_none(), "second burst at frame {frame}");
                burst_frame = Some(frame);
                match &shell {
                    Shell::Burst(sparks) => assert_eq!(sparks.len(), 120),
                    Shell::Rising(_) => unreachable!(),
                }
            }
        }

        assert_eq!(burst_frame, Some(24));
        assert!(shell.is_finished());
    }

    #[test]
    fn burst_sizes_follow_class() {
        let params = FireworkParams::default();
        let mut harness = Harness::new(2);
        for (kind, expected) in [
            (ShellKind::Small, 60),
            (ShellKind::Classic, 80),
            (ShellKind::Large, 120),
        ] {
            let sparks = launcher(kind, 600.0, 1.0).explode(&params, &mut harness.ctx());
            assert_eq!(sparks.len(), expected);
        }
    }

    #[test]
    fn sparks_respect_lifetime_speed_and_palette() {
        let params = FireworkParams::default();
        let (low, high) = params.lifetime_bounds();
        assert_eq!((low, high), (48, 96));

        let mut harness = Harness::new(3);
        let sparks = launcher(ShellKind::Small, 600.0, 1.0).explode(&params, &mut harness.ctx());
        for spark in &sparks {
            assert!((low..=high).contains(&spark.remaining_life));
            let speed = spark.velocity.length();
            assert!(speed >= 2.0 - 1e-3 && speed <= 7.0 + 1e-3, "speed {speed}");
            assert!(params.palette.contains(&spark.color));
            assert!((spark.size - 3.0).abs() < 1e-5);
            assert_eq!(spark.position, Vec2::new(960.0, 1080.0));
        }
    }

    #[test]
    fn classic_sparks_gain_speed_with_energy() {
        let params = FireworkParams::default();
        let mut harness = Harness::new(4);
        let sparks = launcher(ShellKind::Classic, 600.0, 3.0).explode(&params, &mut harness.ctx());
        assert!(sparks
            .iter()
            .all(|s| s.velocity.length() >= 8.0 - 1e-3 && s.velocity.length() <= 14.0 + 1e-3));
    }

    #[test]
    fn show_launches_within_margins_and_clears() {
        let mut show = FireworkShow::new(FireworkParams::default());
        let mut harness = Harness::new(5);
        let drive = Drive {
            energy: 1.5,
            smoothed: 1.5,
        };

        for _ in 0..10 {
            show.spawn(
                &SpawnRequest::steady(Tier::Small),
                &FeatureFrame::SILENT,
                &drive,
                &mut harness.ctx(),
            );
        }
        assert_eq!(show.live_count(), 10);
        for shell in show.shells() {
            match shell {
                Shell::Rising(l) => {
                    assert!(l.position.x >= 200.0 && l.position.x <= 1720.0);
                    assert_eq!(l.position.y, 1080.0);
                    assert!(params_apex().contains(l.apex));
                }
                Shell::Burst(_) => panic!("new shells must be rising"),
            }
        }

        for _ in 0..400 {
            show.advance(&FeatureFrame::SILENT, &drive, &mut harness.ctx());
        }
        assert_eq!(show.live_count(), 0);
    }

    fn params_apex() -> Span {
        FireworkParams::default().apex
    }

    #[test]
    fn cull_drops_oldest_shells() {
        let mut show = FireworkShow::new(FireworkParams::default());
        let mut harness = Harness::new(6);
        for _ in 0..5 {
            show.launch(ShellKind::Small, 1.0, &mut harness.ctx());
        }
        show.cull_to(2);
        assert_eq!(show.live_count(), 2);
        match &show.shells()[0] {
            Shell::Rising(l) => assert_eq!(l.id, ParticleId(3)),
            Shell::Burst(_) => unreachable!(),
        }
    }

    #[test]
    fn gated_config_launches_classic_shells() {
        let config = FireworkConfig::gated();
        let mut spawner = SpawnController::new(config.spawn.clone()).unwrap();
        let mut show = FireworkShow::new(config.params.clone());
        let mut harness = Harness::new(7);

        // Loud enough to sit at the 0.2 cap.
        let mut launched = 0;
        for _ in 0..1_000 {
            let decision = spawner.decide(10.0, show.live_count(), &mut harness.rng);
            for request in &decision.requests {
                show.spawn(request, &FeatureFrame::SILENT, &decision.drive, &mut harness.ctx());
                launched += 1;
            }
        }

        assert!((150..=250).contains(&launched), "launched {launched}");
        assert!(show
            .shells()
            .iter()
            .all(|s| matches!(s, Shell::Rising(l) if l.kind == ShellKind::Classic)));
    }
}
