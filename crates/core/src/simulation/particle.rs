use glam::Vec2;
use serde::{Deserialize, Serialize};

/// 8-bit RGB color.
pub type Color = [u8; 3];

/// Identity of a particle, launcher, raindrop or splash. Never reused within
/// a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticleId(pub u64);

#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// Hands out the next unused id.
    pub fn next_id(&mut self) -> ParticleId {
        let id = ParticleId(self.next);
        self.next += 1;
        id
    }

    #[cfg(test)]
    pub(crate) fn issued(&self) -> u64 {
        self.next
    }
}

/// Per-frame integration and decay constants for [`Particle`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    /// Added to the vertical velocity each frame (screen y grows downwards).
    pub gravity: f32,
    /// Multiplied into the size each frame.
    pub shrink: f32,
    /// Particles smaller than this are removed.
    pub min_size: f32,
}

impl Default for Kinematics {
    fn default() -> Self {
        Self {
            gravity: 0.05,
            shrink: 0.96,
            min_size: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub id: ParticleId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub color: Color,
    pub remaining_life: u32,
    pub size: f32,
}

impl Particle {
    /// One frame of airborne physics: move, fall, age and shrink.
    pub fn advance(&mut self, kinematics: &Kinematics) {
        self.position += self.velocity;
        self.velocity.y += kinematics.gravity;
        self.remaining_life = self.remaining_life.saturating_sub(1);
        self.size *= kinematics.shrink;
    }

    pub fn is_spent(&self, min_size: f32) -> bool {
        self.remaining_life == 0 || self.size < min_size || !(self.size > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(life: u32, size: f32) -> Particle {
        Particle {
            id: ParticleId(0),
            position: Vec2::new(10.0, 10.0),
            velocity: Vec2::new(1.0, -2.0),
            color: [255, 0, 0],
            remaining_life: life,
            size,
        }
    }

    #[test]
    fn advance_integrates_then_accelerates() {
        let mut p = particle(10, 3.0);
        p.advance(&Kinematics::default());

        assert_eq!(p.position, Vec2::new(11.0, 8.0));
        assert!((p.velocity.y - -1.95).abs() < 1e-6);
        assert_eq!(p.remaining_life, 9);
        assert!((p.size - 2.88).abs() < 1e-6);
    }

    #[test]
    fn spent_by_life_or_size() {
        let kinematics = Kinematics::default();
        let mut p = particle(1, 3.0);
        p.advance(&kinematics);
        assert!(p.is_spent(kinematics.min_size));

        let mut p = particle(100, 1.02);
        assert!(!p.is_spent(kinematics.min_size));
        p.advance(&kinematics);
        assert!(p.is_spent(kinematics.min_size));
    }

    #[test]
    fn ids_are_unique() {
        let mut ids = IdAllocator::default();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert_eq!(ids.issued(), 2);
    }
}
