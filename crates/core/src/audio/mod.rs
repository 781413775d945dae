use std::{sync::Arc, time::Duration};

use crate::{FeatureExtractor, FeatureFrame, FeatureSettings, ParticleFxError, Result};

/// Immutable mono buffer of signed 16-bit amplitudes.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Arc<[i16]>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Wraps decoded mono samples. A zero sample rate is rejected.
    pub fn new(samples: impl Into<Arc<[i16]>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(ParticleFxError::config("sample rate must be greater than zero"));
        }
        Ok(Self {
            samples: samples.into(),
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playing time of the whole buffer.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Per-frame feature lookup over a decoded track.
///
/// Frame `f` covers the samples starting at `f * samples_per_frame`. Lookups
/// past the end of the track return silence, so callers can keep asking for
/// frames while the playback clock runs out.
#[derive(Debug)]
pub struct AudioFeatureSource {
    buffer: SampleBuffer,
    samples_per_frame: usize,
    frame_count: usize,
    extractor: FeatureExtractor,
}

impl AudioFeatureSource {
    /// Wraps a decoded buffer. Fails when the settings cannot produce a
    /// usable frame basis.
    pub fn load(
        samples: impl Into<Arc<[i16]>>,
        sample_rate: u32,
        settings: FeatureSettings,
    ) -> Result<Self> {
        let buffer = SampleBuffer::new(samples, sample_rate)?;
        Self::from_buffer(buffer, settings)
    }

    pub fn from_buffer(buffer: SampleBuffer, settings: FeatureSettings) -> Result<Self> {
        settings.validate()?;

        let samples_per_frame =
            (buffer.sample_rate() as f64 / settings.feature_fps as f64).round() as usize;
        if samples_per_frame == 0 {
            return Err(ParticleFxError::config(format!(
                "feature_fps {} exceeds the sample rate {}",
                settings.feature_fps,
                buffer.sample_rate()
            )));
        }

        let frame_count = buffer.len() / samples_per_frame;
        tracing::debug!(
            sample_rate = buffer.sample_rate(),
            samples_per_frame,
            frame_count,
            "loaded feature source"
        );

        let extractor = FeatureExtractor::new(settings, buffer.sample_rate());
        Ok(Self {
            buffer,
            samples_per_frame,
            frame_count,
            extractor,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    /// Number of complete feature frames in the track (`F`).
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn feature_fps(&self) -> u32 {
        self.extractor.settings().feature_fps
    }

    pub fn duration(&self) -> Duration {
        self.buffer.duration()
    }

    pub fn settings(&self) -> &FeatureSettings {
        self.extractor.settings()
    }

    /// Features for `frame_index`. Silence once the index reaches `F`.
    pub fn feature_at(&mut self, frame_index: usize) -> FeatureFrame {
        if frame_index >= self.frame_count {
            return FeatureFrame::SILENT;
        }

        let samples = self.buffer.samples();
        let start = frame_index.saturating_mul(self.samples_per_frame);
        if start >= samples.len() {
            return FeatureFrame::SILENT;
        }

        let window_len = self
            .extractor
            .settings()
            .window_len
            .unwrap_or(self.samples_per_frame);
        let end = start.saturating_add(window_len).min(samples.len());

        self.extractor.extract(&self.buffer.samples[start..end])
    }

    /// Features for every frame of the track, in order.
    pub fn precompute(&mut self) -> Vec<FeatureFrame> {
        (0..self.frame_count).map(|f| self.feature_at(f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BandSettings, BroadbandMode};

    fn square_wave(len: usize, amplitude: i16) -> Vec<i16> {
        (0..len)
            .map(|i| if (i / 20) % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    fn source(samples: Vec<i16>, settings: FeatureSettings) -> AudioFeatureSource {
        AudioFeatureSource::load(samples, 6_000, settings).unwrap()
    }

    #[test]
    fn frame_count_floors_partial_frames() {
        let src = source(vec![1; 250], FeatureSettings::default());
        assert_eq!(src.samples_per_frame(), 100);
        assert_eq!(src.frame_count(), 2);
    }

    #[test]
    fn exhausted_frames_are_silent() {
        let settings = FeatureSettings {
            bands: Some(BandSettings::default()),
            ..Default::default()
        };
        let mut src = source(square_wave(1000, 5000), settings);
        let frames = src.frame_count();
        assert!(!src.feature_at(0).is_silent());

        for index in [frames, frames + 1, usize::MAX] {
            let frame = src.feature_at(index);
            assert_eq!(frame, FeatureFrame::SILENT);
            assert!(!frame.broadband_energy.is_nan());
        }
    }

    #[test]
    fn partial_window_is_clamped_to_buffer() {
        let settings = FeatureSettings {
            window_len: Some(1024),
            broadband: BroadbandMode::Magnitude,
            ..Default::default()
        };
        let mut src = source(vec![3000; 450], settings);
        // Last full frame starts at 300 and the window runs past the end.
        let frame = src.feature_at(3);
        assert!((frame.broadband_energy - 3.0).abs() < 1e-4);
    }

    #[test]
    fn features_are_deterministic() {
        let settings = FeatureSettings {
            bands: Some(BandSettings::default()),
            ..Default::default()
        };
        let mut src = source(square_wave(2000, 8000), settings);
        let first = src.precompute();
        let second = src.precompute();
        assert_eq!(first, second);
        assert_eq!(first.len(), src.frame_count());
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let err = AudioFeatureSource::load(vec![0_i16; 10], 0, FeatureSettings::default());
        assert!(err.is_err());
    }

    #[test]
    fn rejects_frame_rate_above_sample_rate() {
        let settings = FeatureSettings {
            feature_fps: 10_000,
            ..Default::default()
        };
        let err = AudioFeatureSource::load(vec![0_i16; 10], 1_000, settings).unwrap_err();
        assert!(format!("{err}").contains("feature_fps"));
    }
}
