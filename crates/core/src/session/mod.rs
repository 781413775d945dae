//! The fixed-rate frame loop.
//!
//! Each tick reads the playback clock, looks up that frame's features, steps
//! the simulation and hands the snapshot to a [`RenderSink`]. The loop ends
//! after the in-flight frame when a control message arrives, when the clock
//! reports that playback stopped, or when the feature index runs off the end
//! of the track.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::{
    AudioFeatureSource, ClockReading, FinishReason, ParticleFxError, ParticleSimulation,
    PlaybackClock, PositionSource, RenderSink, Result,
};

/// Control messages the frame loop listens for between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignal {
    /// The user asked to leave.
    Quit,
    /// Audio playback reached the end of the track.
    PlaybackFinished,
}

/// Where the loop takes the current feature index from.
#[derive(Clone, Copy)]
pub enum ClockDrive<'a> {
    /// Time since the loop started.
    WallClock,
    /// Position reported by the playback backend.
    Reported(&'a dyn PositionSource),
    /// One render tick per `feature_fps / render_fps` feature frames.
    FrameLocked,
}

impl std::fmt::Debug for ClockDrive<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockDrive::WallClock => f.write_str("WallClock"),
            ClockDrive::Reported(_) => f.write_str("Reported"),
            ClockDrive::FrameLocked => f.write_str("FrameLocked"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoopOptions<'a> {
    pub render_fps: u32,
    /// Sleep to hold `render_fps`.
    pub pacing: bool,
    pub clock: ClockDrive<'a>,
    /// Stop after this many rendered frames.
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Exhausted,
    Stopped,
    PlaybackFinished,
    Quit,
    FrameLimit,
}

impl From<FinishReason> for EndReason {
    fn from(reason: FinishReason) -> Self {
        match reason {
            FinishReason::Exhausted => EndReason::Exhausted,
            FinishReason::Stopped => EndReason::Stopped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames: u64,
    pub end: EndReason,
    pub overruns: u64,
}

/// Holds a fixed frame period by sleeping until the next deadline.
#[derive(Debug)]
pub struct FramePacer {
    period: Duration,
    next_deadline: Instant,
    overruns: u64,
}

impl FramePacer {
    pub fn new(fps: u32) -> Result<Self> {
        if fps == 0 {
            return Err(ParticleFxError::config("render fps must be greater than zero"));
        }
        Ok(Self {
            period: Duration::from_secs_f64(1.0 / fps as f64),
            next_deadline: Instant::now(),
            overruns: 0,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Blocks until the end of the current frame period. A frame that ran
    /// past its deadline restarts the schedule from now.
    pub fn wait(&mut self) {
        self.next_deadline += self.period;
        let now = Instant::now();
        if now < self.next_deadline {
            std::thread::sleep(self.next_deadline - now);
        } else {
            self.next_deadline = now;
            self.overruns += 1;
            tracing::trace!(overruns = self.overruns, "frame overrun");
        }
    }
}

/// Runs the frame loop until one of its end conditions fires.
pub fn run(
    source: &mut AudioFeatureSource,
    simulation: &mut ParticleSimulation,
    sink: &mut dyn RenderSink,
    signals: &Receiver<LoopSignal>,
    options: LoopOptions<'_>,
) -> Result<RunSummary> {
    let mut clock = PlaybackClock::for_source(source)?;
    let mut pacer = if options.pacing {
        Some(FramePacer::new(options.render_fps)?)
    } else {
        None
    };

    tracing::info!(
        effect = %simulation.kind(),
        frames = source.frame_count(),
        render_fps = options.render_fps,
        clock = ?options.clock,
        "frame loop started"
    );

    let started = Instant::now();
    let mut frames = 0_u64;

    let end = loop {
        match signals.try_recv() {
            Ok(LoopSignal::Quit) => break EndReason::Quit,
            Ok(LoopSignal::PlaybackFinished) => break EndReason::PlaybackFinished,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
        }
        if options.max_frames.map_or(false, |max| frames >= max) {
            break EndReason::FrameLimit;
        }

        let reading = match options.clock {
            ClockDrive::WallClock => clock.frame_for_elapsed(started.elapsed()),
            ClockDrive::Reported(position) => clock.frame_for_position(position.position_ms()),
            ClockDrive::FrameLocked => clock.frame_for_tick(frames, options.render_fps),
        };
        let index = match reading {
            ClockReading::Frame(index) => index,
            ClockReading::Finished(reason) => break reason.into(),
        };

        let features = source.feature_at(index);
        let snapshot = simulation.step(&features);
        sink.present(&snapshot)?;
        frames += 1;

        if let Some(pacer) = pacer.as_mut() {
            pacer.wait();
        }
    };

    sink.finish()?;

    let summary = RunSummary {
        frames,
        end,
        overruns: pacer.as_ref().map_or(0, FramePacer::overruns),
    };
    tracing::info!(
        frames,
        end = ?summary.end,
        elapsed = ?started.elapsed(),
        overruns = summary.overruns,
        "frame loop ended"
    );
    Ok(summary)
}
