use serde::{Deserialize, Serialize};

use crate::FeatureFrame;

/// Feature a drive signal reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSource {
    Broadband,
    LowBand,
    HighBand,
}

/// Describes how a feature frame is reduced to the scalar energy a variant
/// feeds its spawn controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveSignal {
    pub source: FeatureSource,
    pub gain: f32,
    #[serde(default)]
    pub ceiling: Option<f32>,
}

impl Default for DriveSignal {
    fn default() -> Self {
        Self::broadband()
    }
}

impl DriveSignal {
    pub fn broadband() -> Self {
        Self {
            source: FeatureSource::Broadband,
            gain: 1.0,
            ceiling: None,
        }
    }

    pub fn high_band() -> Self {
        Self {
            source: FeatureSource::HighBand,
            gain: 1.0,
            ceiling: None,
        }
    }

    pub fn evaluate(&self, frame: &FeatureFrame) -> f32 {
        let raw = match self.source {
            FeatureSource::Broadband => frame.broadband_energy,
            FeatureSource::LowBand => frame.low_band_energy,
            FeatureSource::HighBand => frame.high_band_energy,
        };
        let value = (raw * self.gain).max(0.0);
        match self.ceiling {
            Some(ceiling) => value.min(ceiling),
            None => value,
        }
    }
}
