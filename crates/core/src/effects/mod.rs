//! The concrete particle effects and the contract they share with
//! [`ParticleSimulation`](crate::ParticleSimulation).

pub mod firework;
pub mod rain;
pub mod snow;
pub mod tables;

use serde::{Deserialize, Serialize};

use crate::{
    simulation::{AccumulationSurface, Bounds, Sprite, StepContext},
    Drive, DriveSignal, FeatureFrame, Result, SpawnRequest, SpawnSettings,
};

pub use firework::{FireworkConfig, FireworkParams, FireworkShow, Launcher, Shell, ShellKind};
pub use rain::{RainConfig, RainField, RainParams, Raindrop, Splash, SplashParams};
pub use snow::{FlakeState, SnowConfig, SnowParams, Snowfall, Snowflake};
pub use tables::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Firework,
    Rain,
    Snow,
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EffectKind::Firework => "firework",
            EffectKind::Rain => "rain",
            EffectKind::Snow => "snow",
        };
        f.write_str(name)
    }
}

/// A particle effect driven frame by frame by the simulation.
///
/// Each frame the simulation asks the spawn controller for a decision based
/// on [`live_count`](Effect::live_count), applies any cull, hands every
/// request to [`spawn`](Effect::spawn) and then calls
/// [`advance`](Effect::advance) once.
pub trait Effect: Send {
    fn kind(&self) -> EffectKind;

    /// Number of top-level entities the spawn policy counts (shells,
    /// raindrops, falling flakes).
    fn live_count(&self) -> usize;

    fn spawn(
        &mut self,
        request: &SpawnRequest,
        frame: &FeatureFrame,
        drive: &Drive,
        ctx: &mut StepContext<'_>,
    );

    /// Drops top-level entities until at most `target` remain. Which ones go
    /// is up to the effect.
    fn cull_to(&mut self, target: usize);

    fn advance(&mut self, frame: &FeatureFrame, drive: &Drive, ctx: &mut StepContext<'_>);

    fn collect_sprites(&self, sprites: &mut Vec<Sprite>);

    fn surface(&self) -> Option<&AccumulationSurface> {
        None
    }
}

/// Per-effect configuration: which feature drives it, how it spawns, and its
/// parameter tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum EffectConfig {
    Firework(FireworkConfig),
    Rain(RainConfig),
    Snow(SnowConfig),
}

impl EffectConfig {
    /// Stock configuration of `kind`.
    pub fn default_for(kind: EffectKind) -> Self {
        match kind {
            EffectKind::Firework => EffectConfig::Firework(FireworkConfig::default()),
            EffectKind::Rain => EffectConfig::Rain(RainConfig::default()),
            EffectKind::Snow => EffectConfig::Snow(SnowConfig::default()),
        }
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            EffectConfig::Firework(_) => EffectKind::Firework,
            EffectConfig::Rain(_) => EffectKind::Rain,
            EffectConfig::Snow(_) => EffectKind::Snow,
        }
    }

    pub fn spawn(&self) -> &SpawnSettings {
        match self {
            EffectConfig::Firework(config) => &config.spawn,
            EffectConfig::Rain(config) => &config.spawn,
            EffectConfig::Snow(config) => &config.spawn,
        }
    }

    pub fn drive(&self) -> &DriveSignal {
        match self {
            EffectConfig::Firework(config) => &config.drive,
            EffectConfig::Rain(config) => &config.drive,
            EffectConfig::Snow(config) => &config.drive,
        }
    }

    /// Validates the spawn settings and the effect's parameters.
    pub fn validate(&self) -> Result<()> {
        self.spawn().validate()?;
        match self {
            EffectConfig::Firework(config) => config.params.validate(),
            EffectConfig::Rain(config) => config.params.validate(),
            EffectConfig::Snow(config) => config.params.validate(),
        }
    }
}

/// Instantiates the effect described by `config` for a screen of `bounds`.
pub fn build(
    config: &EffectConfig,
    bounds: Bounds,
) -> Result<(Box<dyn Effect>, SpawnSettings, DriveSignal)> {
    config.validate()?;
    let effect: Box<dyn Effect> = match config {
        EffectConfig::Firework(config) => Box::new(FireworkShow::new(config.params.clone())),
        EffectConfig::Rain(config) => Box::new(RainField::new(config.params.clone())?),
        EffectConfig::Snow(config) => Box::new(Snowfall::new(config.params.clone(), bounds)?),
    };
    Ok((effect, config.spawn().clone(), config.drive().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configs_round_trip_through_json() {
        for kind in [EffectKind::Firework, EffectKind::Rain, EffectKind::Snow] {
            let config = EffectConfig::default_for(kind);
            let json = serde_json::to_string(&config).unwrap();
            let parsed: EffectConfig = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, config);
            assert_eq!(parsed.kind(), kind);
        }
    }

    #[test]
    fn build_matches_kind() {
        let bounds = Bounds::new(320, 240).unwrap();
        for kind in [EffectKind::Firework, EffectKind::Rain, EffectKind::Snow] {
            let (effect, _, _) = build(&EffectConfig::default_for(kind), bounds).unwrap();
            assert_eq!(effect.kind(), kind);
            assert_eq!(effect.live_count(), 0);
        }
    }
}
