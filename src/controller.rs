//! The per-tick decision contract between the simulation and whatever
//! controls an agent.

use crate::physics::{Actor, Obstacle};

pub const SENSOR_COUNT: usize = 3;
pub const FLAP_THRESHOLD: f32 = 0.5;

/// `[y, |y - bottom_edge|, |y - top_edge|]` relative to the active obstacle.
pub type Sensors = [f32; SENSOR_COUNT];

pub fn observe(actor: &Actor, obstacle: &Obstacle) -> Sensors {
    [
        actor.y,
        (actor.y - obstacle.bottom_edge).abs(),
        (actor.y - obstacle.top_edge).abs(),
    ]
}

/// A stateless query: the simulation only thresholds the returned scalar.
pub trait Controller {
    fn decide(&self, sensors: &Sensors) -> f32;
}

impl<F> Controller for F
where
    F: Fn(&Sensors) -> f32,
{
    fn decide(&self, sensors: &Sensors) -> f32 {
        self(sensors)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Flap,
    Glide,
}

impl Action {
    /// Non-finite output means no action; finite output is clamped to
    /// `[-1, 1]` before thresholding.
    pub fn from_signal(signal: f32) -> Self {
        if !signal.is_finite() {
            return Action::Glide;
        }
        if signal.clamp(-1.0, 1.0) > FLAP_THRESHOLD {
            Action::Flap
        } else {
            Action::Glide
        }
    }
}
