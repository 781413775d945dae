//! Core library for the music particle effects.
//!
//! A decoded track is turned into per-frame audio features
//! ([`AudioFeatureSource`]), a [`PlaybackClock`] maps playback progress onto
//! feature frames, and a [`ParticleSimulation`] turns each frame's features
//! into spawn decisions and particle motion for one of three effects:
//! fireworks, rain with splashes, or snow that piles up on the ground.
//! Rendering is left to a [`RenderSink`]; the crate only produces
//! [`Snapshot`]s.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod effects;
pub mod error;
pub mod mapping;
pub mod playback;
pub mod render;
pub mod session;
pub mod simulation;
pub mod spawn;
pub mod timeline;

pub use analysis::{
    BandReduction, BandSettings, BroadbandMode, FeatureExtractor, FeatureFrame, FeatureSettings,
    Taper,
};
pub use audio::{AudioFeatureSource, SampleBuffer};
pub use config::{AppConfig, RenderConfig};
pub use effects::{Effect, EffectConfig, EffectKind};
pub use error::{ParticleFxError, Result};
pub use mapping::{DriveSignal, FeatureSource};
pub use playback::{PositionSource, Transport, STOPPED};
pub use render::{NullSink, RecordingSink, RenderSink};
pub use session::{ClockDrive, EndReason, FramePacer, LoopOptions, LoopSignal, RunSummary};
pub use simulation::{
    Bounds, ParticleId, ParticleSimulation, Ring, Snapshot, Sprite, SpriteKind,
};
pub use spawn::{
    BeatBurst, BeatDetector, Categorical, Drive, SpawnCause, SpawnController, SpawnDecision,
    SpawnRequest, SpawnSettings, SteadyPolicy, Surge, Tier,
};
pub use timeline::{ClockReading, FinishReason, PlaybackClock};
