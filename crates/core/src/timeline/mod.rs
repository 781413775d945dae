use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ParticleFxError, Result};

/// Why a clock stopped producing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The feature index reached the end of the track.
    Exhausted,
    /// The playback position reported that playback is not running.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockReading {
    Frame(usize),
    Finished(FinishReason),
}

/// Maps playback progress onto feature frame indices.
///
/// Three sources of progress are supported: a playback position in
/// milliseconds reported by the audio backend, wall-clock time since
/// playback started, and the render tick counter for frame-locked runs.
/// Whatever the source, the reported index never goes backwards.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    feature_fps: u32,
    sample_rate: u32,
    samples_per_frame: usize,
    frame_count: usize,
    last: Option<usize>,
}

impl PlaybackClock {
    pub fn new(
        feature_fps: u32,
        sample_rate: u32,
        samples_per_frame: usize,
        frame_count: usize,
    ) -> Result<Self> {
        if feature_fps == 0 || sample_rate == 0 || samples_per_frame == 0 {
            return Err(ParticleFxError::config(
                "clock needs a non-zero feature rate, sample rate and frame size",
            ));
        }
        Ok(Self {
            feature_fps,
            sample_rate,
            samples_per_frame,
            frame_count,
            last: None,
        })
    }

    /// Clock matching the frame basis of a loaded feature source.
    pub fn for_source(source: &crate::AudioFeatureSource) -> Result<Self> {
        Self::new(
            source.feature_fps(),
            source.sample_rate(),
            source.samples_per_frame(),
            source.frame_count(),
        )
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Reading for a playback position. A negative position means playback
    /// has not started or was stopped.
    pub fn frame_for_position(&mut self, position_ms: i64) -> ClockReading {
        if position_ms < 0 {
            return ClockReading::Finished(FinishReason::Stopped);
        }
        let raw = (position_ms as u64 * u64::from(self.feature_fps) / 1000) as usize;
        self.settle(raw)
    }

    /// Reading for wall-clock time since playback began.
    pub fn frame_for_elapsed(&mut self, elapsed: Duration) -> ClockReading {
        let samples = elapsed.as_secs_f64() * self.sample_rate as f64;
        let raw = (samples / self.samples_per_frame as f64).floor() as usize;
        self.settle(raw)
    }

    /// Reading for render tick `tick` when features advance in lockstep with
    /// rendering.
    pub fn frame_for_tick(&mut self, tick: u64, render_fps: u32) -> ClockReading {
        let render_fps = u64::from(render_fps.max(1));
        let raw = (tick * u64::from(self.feature_fps) / render_fps) as usize;
        self.settle(raw)
    }

    fn settle(&mut self, raw: usize) -> ClockReading {
        let index = match self.last {
            Some(last) if raw < last => last,
            _ => raw,
        };
        self.last = Some(index);
        if index >= self.frame_count {
            ClockReading::Finished(FinishReason::Exhausted)
        } else {
            ClockReading::Frame(index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(frame_count: usize) -> PlaybackClock {
        // 44.1 kHz at 60 feature frames per second.
        PlaybackClock::new(60, 44_100, 735, frame_count).unwrap()
    }

    #[test]
    fn position_maps_to_frames() {
        let mut clock = clock(1_000);
        assert_eq!(clock.frame_for_position(0), ClockReading::Frame(0));
        assert_eq!(clock.frame_for_position(16), ClockReading::Frame(0));
        assert_eq!(clock.frame_for_position(17), ClockReading::Frame(1));
        assert_eq!(clock.frame_for_position(1_000), ClockReading::Frame(60));
    }

    #[test]
    fn backward_jitter_repeats_last_index() {
        let mut clock = clock(1_000);
        assert_eq!(clock.frame_for_position(500), ClockReading::Frame(30));
        assert_eq!(clock.frame_for_position(480), ClockReading::Frame(30));
        assert_eq!(clock.frame_for_position(520), ClockReading::Frame(31));
    }

    #[test]
    fn negative_position_means_stopped() {
        let mut clock = clock(1_000);
        assert_eq!(
            clock.frame_for_position(-1),
            ClockReading::Finished(FinishReason::Stopped)
        );
    }

    #[test]
    fn end_of_track_finishes() {
        let mut clock = clock(10);
        assert_eq!(clock.frame_for_tick(9, 60), ClockReading::Frame(9));
        assert_eq!(
            clock.frame_for_tick(10, 60),
            ClockReading::Finished(FinishReason::Exhausted)
        );
    }

    #[test]
    fn elapsed_time_uses_sample_basis() {
        let mut clock = clock(1_000);
        assert_eq!(
            clock.frame_for_elapsed(Duration::from_secs(1)),
            ClockReading::Frame(60)
        );
        assert_eq!(
            clock.frame_for_elapsed(Duration::from_millis(500)),
            ClockReading::Frame(60)
        );
    }

    #[test]
    fn frame_locked_scales_between_rates() {
        // Rain analyses 20 frames per second while rendering at 60.
        let mut clock = PlaybackClock::new(20, 44_100, 2_205, 100).unwrap();
        let frames: Vec<_> = (0..7).map(|tick| clock.frame_for_tick(tick, 60)).collect();
        let expected: Vec<_> = [0, 0, 0, 1, 1, 1, 2]
            .into_iter()
            .map(ClockReading::Frame)
            .collect();
        assert_eq!(frames, expected);
    }

    #[test]
    fn rejects_zero_rates() {
        assert!(PlaybackClock::new(0, 44_100, 735, 10).is_err());
        assert!(PlaybackClock::new(60, 0, 735, 10).is_err());
    }
}
