use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    effects::FireworkConfig, BandReduction, BandSettings, BroadbandMode, EffectConfig,
    EffectKind, FeatureSettings, ParticleFxError, Result,
};

/// Top-level configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub analysis: FeatureSettings,
    pub effect: EffectConfig,
    /// Fixes the random stream when set. The command line seed wins.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::preset(EffectKind::Firework)
    }
}

impl AppConfig {
    /// Settings that reproduce the stock look of each effect.
    pub fn preset(kind: EffectKind) -> Self {
        let analysis = match kind {
            EffectKind::Firework => FeatureSettings::default(),
            EffectKind::Rain => FeatureSettings {
                feature_fps: 20,
                broadband_scale: 5000.0,
                bands: Some(BandSettings {
                    low_min_hz: 20.0,
                    split_hz: 250.0,
                    high_max_hz: Some(2000.0),
                    reduction: BandReduction::Sum,
                    scale: 1.0,
                    ceiling: None,
                }),
                ..FeatureSettings::default()
            },
            EffectKind::Snow => FeatureSettings {
                window_len: Some(1024),
                bands: Some(BandSettings {
                    low_min_hz: 0.0,
                    split_hz: 400.0,
                    high_max_hz: None,
                    reduction: BandReduction::Mean,
                    scale: 1e4,
                    ceiling: Some(1.0),
                }),
                ..FeatureSettings::default()
            },
        };

        Self {
            render: RenderConfig::default(),
            analysis,
            effect: EffectConfig::default_for(kind),
            seed: None,
        }
    }

    /// Fireworks launched at random with odds that rise with the mean
    /// absolute amplitude, every shell of the classic class.
    pub fn firework_classic() -> Self {
        Self {
            analysis: FeatureSettings {
                broadband: BroadbandMode::Magnitude,
                ..FeatureSettings::default()
            },
            effect: EffectConfig::Firework(FireworkConfig::gated()),
            ..Self::preset(EffectKind::Firework)
        }
    }

    /// Parses a JSON config and validates it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates the JSON config at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), effect = %config.effect.kind(), "loaded config");
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        self.analysis.validate()?;
        self.effect.validate()
    }
}

/// Output frame rate and screen size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Sleep between frames to hold `fps`. Offline runs turn this off.
    pub pacing: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            width: 1920,
            height: 1080,
            pacing: true,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(ParticleFxError::config("render fps must be greater than zero"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ParticleFxError::config(format!(
                "screen dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SteadyPolicy, Taper};

    #[test]
    fn presets_validate_and_round_trip() {
        for kind in [EffectKind::Firework, EffectKind::Rain, EffectKind::Snow] {
            let config = AppConfig::preset(kind);
            config.validate().unwrap();
            let json = config.to_json_pretty().unwrap();
            assert_eq!(AppConfig::from_json_str(&json).unwrap(), config);
        }
    }

    #[test]
    fn minimal_file_fills_in_defaults() {
        let json = r#"{
            "effect": {
                "variant": "rain",
                "drive": { "source": "broadband", "gain": 1.0 },
                "spawn": { "steady": { "kind": "target_count", "smoothing": 0.8, "min": 5, "max": 50 } },
                "params": {
                    "styles": [
                        { "weight": 1.0, "length": { "min": 8.0, "max": 15.0 }, "speed": { "min": 3.0, "max": 6.0 }, "thickness": 1 }
                    ],
                    "ground_offset": 60.0,
                    "reentry": { "min": -30.0, "max": 0.0 },
                    "speed_energy_gain": 1.5,
                    "spread_base": 0.2,
                    "spread_gain": 0.5,
                    "ratio_epsilon": 1e-6,
                    "color": [192, 192, 192],
                    "splash": {
                        "base_probability": 0.5, "bass_bias": 0.5, "radius_base": 4.0, "radius_gain": 8.0,
                        "max_radius_margin": 20.0, "max_radius_gain": 15.0, "growth": 1.5, "alpha": 220.0,
                        "fade": 4.0, "min_rings": 2, "ring_gain": 4.0, "ring_scale": 0.6, "ring_step": 0.25,
                        "ring_alpha_step": 30.0, "color": [180, 200, 255]
                    }
                }
            },
            "seed": 9
        }"#;

        let config = AppConfig::from_json_str(json).unwrap();
        assert_eq!(config.render, RenderConfig::default());
        assert_eq!(config.analysis.taper, Taper::Rectangular);
        assert_eq!(config.effect.kind(), EffectKind::Rain);
        assert_eq!(config.seed, Some(9));
        assert!(config.effect.spawn().burst.is_none());
        assert_eq!(
            config.effect.spawn().steady,
            SteadyPolicy::TargetCount {
                smoothing: 0.8,
                min: 5,
                max: 50
            }
        );
    }

    #[test]
    fn rejects_degenerate_settings() {
        let mut config = AppConfig::preset(EffectKind::Snow);
        config.render.height = 0;
        assert!(matches!(config.validate(), Err(ParticleFxError::InvalidConfig(_))));

        let mut config = AppConfig::preset(EffectKind::Rain);
        config.analysis.feature_fps = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::preset(EffectKind::Firework);
        config.render.fps = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::preset(EffectKind::Snow);
        if let EffectConfig::Snow(snow) = &mut config.effect {
            snow.params.drift_step = -0.005;
        }
        assert!(matches!(config.validate(), Err(ParticleFxError::InvalidConfig(_))));
        assert!(crate::ParticleSimulation::from_config(&config, Some(1)).is_err());

        assert!(matches!(
            AppConfig::from_json_str("{ not json"),
            Err(ParticleFxError::Json(_))
        ));
    }

    #[test]
    fn classic_firework_preset_gates_on_magnitude() {
        let config = AppConfig::firework_classic();
        config.validate().unwrap();
        assert_eq!(config.analysis.broadband, BroadbandMode::Magnitude);
        assert_eq!(config.analysis.broadband_scale, 1000.0);
        assert_eq!(config.effect, EffectConfig::Firework(FireworkConfig::gated()));
        assert_eq!(
            config.effect.spawn().steady,
            SteadyPolicy::ProbabilityGated {
                base: 0.05,
                divisor: 50.0,
                max: 0.2
            }
        );

        let json = config.to_json_pretty().unwrap();
        assert_eq!(AppConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn rain_preset_analyses_fifty_millisecond_chunks() {
        let config = AppConfig::preset(EffectKind::Rain);
        assert_eq!(config.analysis.feature_fps, 20);
        assert_eq!(config.analysis.broadband_scale, 5000.0);
        let bands = config.analysis.bands.unwrap();
        assert_eq!((bands.split_hz, bands.high_max_hz), (250.0, Some(2000.0)));
    }
}
