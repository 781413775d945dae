use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{ParticleFxError, Result};

/// Audio-energy summary attached to one simulation tick.
///
/// Every field is non-negative. An exhausted or silent window yields the
/// default (all-zero) frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    pub broadband_energy: f32,
    pub low_band_energy: f32,
    pub high_band_energy: f32,
}

impl FeatureFrame {
    pub const SILENT: FeatureFrame = FeatureFrame {
        broadband_energy: 0.0,
        low_band_energy: 0.0,
        high_band_energy: 0.0,
    };

    /// Share of the band energy that sits in the low band, in `[0, 1)`.
    pub fn low_ratio(&self, epsilon: f32) -> f32 {
        self.low_band_energy / (self.low_band_energy + self.high_band_energy + epsilon)
    }

    pub fn is_silent(&self) -> bool {
        self.broadband_energy == 0.0 && self.low_band_energy == 0.0 && self.high_band_energy == 0.0
    }
}

/// How the broadband energy of a window is reduced to a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadbandMode {
    /// Mean absolute amplitude. Cheap and a little jumpy.
    Magnitude,
    /// Root mean square.
    Rms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandReduction {
    Sum,
    Mean,
}

/// Window applied to the samples before the frequency transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Taper {
    Rectangular,
    Hann,
}

/// Low/high band split settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSettings {
    pub low_min_hz: f32,
    /// Upper edge of the low band (exclusive) and lower edge of the high band.
    pub split_hz: f32,
    /// Upper edge of the high band (inclusive). `None` means Nyquist.
    pub high_max_hz: Option<f32>,
    pub reduction: BandReduction,
    pub scale: f32,
    /// Optional cap applied after scaling.
    pub ceiling: Option<f32>,
}

impl Default for BandSettings {
    fn default() -> Self {
        Self {
            low_min_hz: 20.0,
            split_hz: 400.0,
            high_max_hz: None,
            reduction: BandReduction::Sum,
            scale: 1.0,
            ceiling: None,
        }
    }
}

/// Everything that shapes how a window of samples becomes a [`FeatureFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSettings {
    /// Feature frames per second. `samples_per_frame = round(sr / feature_fps)`.
    pub feature_fps: u32,
    pub broadband: BroadbandMode,
    pub broadband_scale: f32,
    /// Fixed analysis window length in samples, starting at the frame's first
    /// sample. Defaults to one frame's worth of samples.
    #[serde(default)]
    pub window_len: Option<usize>,
    #[serde(default)]
    pub bands: Option<BandSettings>,
    pub taper: Taper,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            feature_fps: 60,
            broadband: BroadbandMode::Rms,
            broadband_scale: 1000.0,
            window_len: None,
            bands: None,
            taper: Taper::Rectangular,
        }
    }
}

impl FeatureSettings {
    pub fn validate(&self) -> Result<()> {
        if self.feature_fps == 0 {
            return Err(ParticleFxError::config("feature_fps must be greater than zero"));
        }
        if !(self.broadband_scale > 0.0) {
            return Err(ParticleFxError::config("broadband_scale must be positive"));
        }
        if self.window_len == Some(0) {
            return Err(ParticleFxError::config("window_len must be greater than zero"));
        }
        if let Some(bands) = &self.bands {
            if !(bands.scale > 0.0) {
                return Err(ParticleFxError::config("band scale must be positive"));
            }
            if bands.low_min_hz < 0.0 || bands.split_hz <= bands.low_min_hz {
                return Err(ParticleFxError::config(
                    "band split must lie above the low band's lower edge",
                ));
            }
            if matches!(bands.high_max_hz, Some(max) if max <= bands.split_hz) {
                return Err(ParticleFxError::config(
                    "high band upper edge must lie above the split frequency",
                ));
            }
        }
        Ok(())
    }
}

/// Turns sample windows into feature frames. Holds the FFT plan and scratch
/// buffers so repeated windows of the same length do not re-plan.
pub struct FeatureExtractor {
    settings: FeatureSettings,
    sample_rate: u32,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl FeatureExtractor {
    pub fn new(settings: FeatureSettings, sample_rate: u32) -> Self {
        Self {
            settings,
            sample_rate,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn settings(&self) -> &FeatureSettings {
        &self.settings
    }

    /// Computes the features of one window. An empty window is silence.
    pub fn extract(&mut self, window: &[i16]) -> FeatureFrame {
        if window.is_empty() {
            return FeatureFrame::SILENT;
        }

        let raw = match self.settings.broadband {
            BroadbandMode::Magnitude => mean_magnitude(window),
            BroadbandMode::Rms => root_mean_square(window),
        };
        let broadband_energy = raw / self.settings.broadband_scale;

        let (low_band_energy, high_band_energy) = match self.settings.bands.clone() {
            Some(bands) => self.band_energies(window, &bands).unwrap_or_else(|err| {
                tracing::warn!(%err, len = window.len(), "band split failed; using silence");
                (0.0, 0.0)
            }),
            None => (0.0, 0.0),
        };

        FeatureFrame {
            broadband_energy,
            low_band_energy,
            high_band_energy,
        }
    }

    fn band_energies(&mut self, window: &[i16], bands: &BandSettings) -> Result<(f32, f32)> {
        let len = window.len();
        if len < 2 {
            return Ok((0.0, 0.0));
        }

        let sample_rate = self.sample_rate as f32;
        let taper = self.settings.taper;
        let fft = self.prepare_fft(len);

        for (index, value) in window.iter().enumerate() {
            let weight = match taper {
                Taper::Rectangular => 1.0,
                Taper::Hann => hann_value(index, len),
            };
            fft.input[index] = *value as f32 * weight;
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let nyquist = sample_rate * 0.5;
        let high_max = bands.high_max_hz.unwrap_or(nyquist).min(nyquist);
        let bin_hz = sample_rate / len as f32;

        let mut low = BandAccumulator::default();
        let mut high = BandAccumulator::default();
        for (i, bin) in fft.spectrum.iter().enumerate() {
            let freq = i as f32 * bin_hz;
            if freq >= bands.low_min_hz && freq < bands.split_hz {
                low.add(bin.norm());
            } else if freq >= bands.split_hz && freq <= high_max {
                high.add(bin.norm());
            }
        }

        let finish = |acc: BandAccumulator| {
            let value = acc.reduce(bands.reduction) / bands.scale;
            match bands.ceiling {
                Some(ceiling) => value.min(ceiling),
                None => value,
            }
        };

        Ok((finish(low), finish(high)))
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        let stale = self.fft.as_ref().map_or(true, |fft| fft.size != size);
        if stale {
            self.fft = None;
        }

        let planner = &mut self.fft_planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            FftResources {
                size,
                scratch: plan.make_scratch_vec(),
                spectrum: plan.make_output_vec(),
                input: plan.make_input_vec(),
                plan,
            }
        })
    }
}

#[derive(Default)]
struct BandAccumulator {
    sum: f32,
    bins: usize,
}

impl BandAccumulator {
    fn add(&mut self, magnitude: f32) {
        self.sum += magnitude;
        self.bins += 1;
    }

    fn reduce(&self, reduction: BandReduction) -> f32 {
        match reduction {
            BandReduction::Sum => self.sum,
            BandReduction::Mean if self.bins == 0 => 0.0,
            BandReduction::Mean => self.sum / self.bins as f32,
        }
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("settings", &self.settings)
            .field("sample_rate", &self.sample_rate)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

/// Mean absolute amplitude of the window, unscaled.
pub fn mean_magnitude(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|sample| (*sample as f64).abs()).sum();
    (sum / samples.len() as f64) as f32
}

/// Root mean square of the window, unscaled. Silence (or a mean square that
/// rounds to zero) is reported as exactly zero.
pub fn root_mean_square(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|sample| {
            let value = *sample as f64;
            value * value
        })
        .sum();
    let mean_square = sum / samples.len() as f64;
    if mean_square <= 0.0 {
        0.0
    } else {
        mean_square.sqrt() as f32
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band_settings() -> FeatureSettings {
        FeatureSettings {
            bands: Some(BandSettings::default()),
            ..Default::default()
        }
    }

    fn tone(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (amplitude * (2.0 * PI * freq * t).sin()) as i16
            })
            .collect()
    }

    #[test]
    fn silence_is_exactly_zero() {
        let mut extractor = FeatureExtractor::new(band_settings(), 48_000);
        let frame = extractor.extract(&[0; 800]);
        assert_eq!(frame, FeatureFrame::SILENT);

        let frame = extractor.extract(&[]);
        assert_eq!(frame, FeatureFrame::SILENT);
    }

    #[test]
    fn rms_and_magnitude_are_scaled() {
        let samples = [1000_i16, -1000, 1000, -1000];
        assert!((root_mean_square(&samples) - 1000.0).abs() < 1e-3);
        assert!((mean_magnitude(&samples) - 1000.0).abs() < 1e-3);

        let mut extractor = FeatureExtractor::new(FeatureSettings::default(), 48_000);
        let frame = extractor.extract(&samples);
        assert!((frame.broadband_energy - 1.0).abs() < 1e-4);
    }

    #[test]
    fn magnitude_mode_uses_mean_absolute_value() {
        let settings = FeatureSettings {
            broadband: BroadbandMode::Magnitude,
            ..Default::default()
        };
        let mut extractor = FeatureExtractor::new(settings, 48_000);
        let frame = extractor.extract(&[2000, 0, -2000, 0]);
        assert!((frame.broadband_energy - 1.0).abs() < 1e-4);
    }

    #[test]
    fn bass_tone_lands_in_low_band() {
        let mut extractor = FeatureExtractor::new(band_settings(), 8_000);
        let frame = extractor.extract(&tone(100.0, 8_000, 800, 10_000.0));
        assert!(frame.low_band_energy > frame.high_band_energy * 4.0);
        assert!(frame.low_ratio(1e-6) > 0.8);
    }

    #[test]
    fn treble_tone_lands_in_high_band() {
        let settings = FeatureSettings {
            taper: Taper::Hann,
            ..band_settings()
        };
        let mut extractor = FeatureExtractor::new(settings, 8_000);
        let frame = extractor.extract(&tone(2_000.0, 8_000, 800, 10_000.0));
        assert!(frame.high_band_energy > frame.low_band_energy * 4.0);
    }

    #[test]
    fn ceiling_caps_band_energy() {
        let settings = FeatureSettings {
            bands: Some(BandSettings {
                reduction: BandReduction::Mean,
                scale: 1e4,
                ceiling: Some(1.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut extractor = FeatureExtractor::new(settings, 8_000);
        let frame = extractor.extract(&tone(100.0, 8_000, 1024, 30_000.0));
        assert!(frame.low_band_energy <= 1.0);
        assert!(frame.high_band_energy <= 1.0);
    }

    #[test]
    fn rejects_degenerate_settings() {
        let settings = FeatureSettings {
            feature_fps: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = FeatureSettings {
            bands: Some(BandSettings {
                split_hz: 10.0,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
