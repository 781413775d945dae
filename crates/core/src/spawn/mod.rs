//! Spawn decisions.
//!
//! A [`SpawnController`] turns the per-frame drive energy into a list of
//! [`SpawnRequest`]s. Exactly one steady policy runs each frame; beat bursts
//! and surges are layered on top and add to whatever the steady policy asked
//! for.

use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};
use serde::{Deserialize, Serialize};

use crate::{ParticleFxError, Result};

/// Size or kind class attached to a spawn request. The variant decides what
/// each tier means; `Default` lets it pick using its own weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Default,
    Small,
    Large,
    Layer(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnCause {
    Steady,
    Burst,
    Surge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnRequest {
    pub tier: Tier,
    pub cause: SpawnCause,
}

impl SpawnRequest {
    pub fn steady(tier: Tier) -> Self {
        Self {
            tier,
            cause: SpawnCause::Steady,
        }
    }
}

/// Energy handed to the variant alongside the spawn requests.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Drive {
    /// This frame's raw drive energy.
    pub energy: f32,
    /// Smoothed energy when the steady policy tracks one, otherwise `energy`.
    pub smoothed: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnDecision {
    pub requests: Vec<SpawnRequest>,
    /// Population size the variant must cull down to, if it is above it.
    pub cull_to: Option<usize>,
    pub drive: Drive,
    pub burst_fired: bool,
}

/// The policy that decides how many top-level entities to create every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SteadyPolicy {
    /// One request with probability `min(base + energy / divisor, max)`.
    ProbabilityGated { base: f32, divisor: f32, max: f32 },
    /// `Large` at or above `large`, else `Small` at or above `small`, while
    /// fewer than `max_live` entities are alive.
    ThresholdTiered {
        large: f32,
        small: f32,
        max_live: usize,
    },
    /// Keeps the population at `clamp(round(max * smoothed), min, max)`.
    TargetCount {
        smoothing: f32,
        min: usize,
        max: usize,
    },
    /// `max(min, floor(energy * gain))` requests every frame.
    PerFrame { min: usize, gain: f32 },
}

/// Extra requests fired on a sudden jump in energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatBurst {
    pub ratio: f32,
    pub epsilon: f32,
    pub min_count: usize,
    pub max_count: usize,
    /// Ignore jumps out of total silence (the very first loud frame).
    pub require_prior_energy: bool,
    pub tier: Tier,
}

impl Default for BeatBurst {
    fn default() -> Self {
        Self {
            ratio: 1.6,
            epsilon: 1e-6,
            min_count: 3,
            max_count: 7,
            require_prior_energy: true,
            tier: Tier::Default,
        }
    }
}

/// A rare forced-tier request while the energy stays above a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surge {
    pub threshold: f32,
    pub probability: f32,
    pub tier: Tier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnSettings {
    pub steady: SteadyPolicy,
    #[serde(default)]
    pub burst: Option<BeatBurst>,
    #[serde(default)]
    pub surge: Option<Surge>,
}

impl SpawnSettings {
    pub fn validate(&self) -> Result<()> {
        match &self.steady {
            SteadyPolicy::ProbabilityGated { base, divisor, max } => {
                if !(*divisor > 0.0) {
                    return Err(ParticleFxError::config("gated divisor must be positive"));
                }
                if !(0.0..=1.0).contains(base) || !(0.0..=1.0).contains(max) {
                    return Err(ParticleFxError::config(
                        "gated probabilities must lie in [0, 1]",
                    ));
                }
            }
            SteadyPolicy::ThresholdTiered {
                large,
                small,
                max_live,
            } => {
                if small > large {
                    return Err(ParticleFxError::config(
                        "small threshold must not exceed the large threshold",
                    ));
                }
                if *max_live == 0 {
                    return Err(ParticleFxError::config("max_live must be greater than zero"));
                }
            }
            SteadyPolicy::TargetCount {
                smoothing,
                min,
                max,
            } => {
                if !(0.0..1.0).contains(smoothing) {
                    return Err(ParticleFxError::config("smoothing must lie in [0, 1)"));
                }
                if min > max {
                    return Err(ParticleFxError::config("target min must not exceed max"));
                }
            }
            SteadyPolicy::PerFrame { gain, .. } => {
                if *gain < 0.0 {
                    return Err(ParticleFxError::config("per-frame gain must not be negative"));
                }
            }
        }

        if let Some(burst) = &self.burst {
            if !(burst.ratio > 0.0) || !(burst.epsilon > 0.0) {
                return Err(ParticleFxError::config(
                    "burst ratio and epsilon must be positive",
                ));
            }
            if burst.min_count > burst.max_count {
                return Err(ParticleFxError::config(
                    "burst min_count must not exceed max_count",
                ));
            }
        }

        if let Some(surge) = &self.surge {
            if !(0.0..=1.0).contains(&surge.probability) {
                return Err(ParticleFxError::config(
                    "surge probability must lie in [0, 1]",
                ));
            }
        }

        Ok(())
    }
}

/// Detects transients by comparing each frame's energy with the previous
/// frame's. `prev` is updated after every check.
#[derive(Debug, Clone, Default)]
pub struct BeatDetector {
    prev_energy: f32,
}

impl BeatDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prev_energy(&self) -> f32 {
        self.prev_energy
    }

    /// Records `energy` and returns whether it counts as a beat under
    /// `burst`.
    pub fn observe(&mut self, energy: f32, burst: &BeatBurst) -> bool {
        let prior_ok = !burst.require_prior_energy || self.prev_energy > 0.0;
        let fired = prior_ok && energy / (self.prev_energy + burst.epsilon) > burst.ratio;
        self.prev_energy = energy;
        fired
    }
}

/// Turns each frame's drive energy into spawn requests for one effect.
pub struct SpawnController {
    settings: SpawnSettings,
    smoothed: f32,
    beats: BeatDetector,
}

impl SpawnController {
    /// Validates `settings` and starts with zero smoothed energy.
    pub fn new(settings: SpawnSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            smoothed: 0.0,
            beats: BeatDetector::new(),
        })
    }

    pub fn settings(&self) -> &SpawnSettings {
        &self.settings
    }

    pub fn smoothed(&self) -> f32 {
        self.smoothed
    }

    /// Decides this frame's spawns from the drive `energy` and the number of
    /// live top-level entities. Call once per simulated frame; the smoothed
    /// energy and the beat detector both advance on every call.
    pub fn decide<R: Rng + ?Sized>(
        &mut self,
        energy: f32,
        live_count: usize,
        rng: &mut R,
    ) -> SpawnDecision {
        let mut decision = SpawnDecision {
            drive: Drive {
                energy,
                smoothed: energy,
            },
            ..Default::default()
        };

        match self.settings.steady {
            SteadyPolicy::ProbabilityGated { base, divisor, max } => {
                let probability = (base + energy / divisor).min(max);
                if rng.gen::<f32>() < probability {
                    decision.requests.push(SpawnRequest::steady(Tier::Default));
                }
            }
            SteadyPolicy::ThresholdTiered {
                large,
                small,
                max_live,
            } => {
                if live_count < max_live {
                    if energy >= large {
                        decision.requests.push(SpawnRequest::steady(Tier::Large));
                    } else if energy >= small {
                        decision.requests.push(SpawnRequest::steady(Tier::Small));
                    }
                }
            }
            SteadyPolicy::TargetCount {
                smoothing,
                min,
                max,
            } => {
                self.smoothed = smoothing * self.smoothed + (1.0 - smoothing) * energy;
                decision.drive.smoothed = self.smoothed;

                let target = ((max as f32 * self.smoothed).round().max(0.0) as usize).clamp(min, max);
                if live_count < target {
                    decision.requests.extend(
                        std::iter::repeat(SpawnRequest::steady(Tier::Default))
                            .take(target - live_count),
                    );
                } else if live_count > target {
                    decision.cull_to = Some(target);
                }
            }
            SteadyPolicy::PerFrame { min, gain } => {
                let count = ((energy * gain).floor().max(0.0) as usize).max(min);
                decision.requests.extend(
                    std::iter::repeat(SpawnRequest::steady(Tier::Default)).take(count),
                );
            }
        }

        if let Some(burst) = &self.settings.burst {
            if self.beats.observe(energy, burst) {
                let count = rng.gen_range(burst.min_count..=burst.max_count);
                decision.burst_fired = true;
                decision
                    .requests
                    .extend(std::iter::repeat(SpawnRequest {
                        tier: burst.tier,
                        cause: SpawnCause::Burst,
                    })
                    .take(count));
            }
        }

        if let Some(surge) = &self.settings.surge {
            if energy > surge.threshold && rng.gen::<f32>() < surge.probability {
                decision.requests.push(SpawnRequest {
                    tier: surge.tier,
                    cause: SpawnCause::Surge,
                });
            }
        }

        decision
    }
}

impl std::fmt::Debug for SpawnController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnController")
            .field("steady", &self.settings.steady)
            .field("smoothed", &self.smoothed)
            .field("prev_energy", &self.beats.prev_energy())
            .finish()
    }
}

/// Weighted choice over a fixed set of classes.
#[derive(Debug, Clone)]
pub struct Categorical {
    index: WeightedIndex<f32>,
}

impl Categorical {
    /// Fails when the weights are empty, negative or all zero.
    pub fn new(weights: &[f32]) -> Result<Self> {
        Ok(Self {
            index: WeightedIndex::new(weights)?,
        })
    }

    /// Index of the chosen class.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.index.sample(rng)
    }
}
