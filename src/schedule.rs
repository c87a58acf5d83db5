use crate::error::NodeError;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::time::Duration;

/// How long the request loop pauses between two cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Schedule {
    /// Uniformly distributed pause in `min..=max`.
    Uniform { min: Duration, max: Duration },
    /// Exponentially distributed pauses, i.e. requests form a Poisson process with `rate` events
    /// per second.
    Poisson { rate: f64 },
}

impl Default for Schedule {
    fn default() -> Self {
        Self::Uniform {
            min: Duration::from_secs(5),
            max: Duration::from_secs(15),
        }
    }
}

impl Schedule {
    pub fn validate(&self) -> Result<(), NodeError> {
        match self {
            Self::Uniform { min, max } if min > max => Err(NodeError::Config(format!(
                "empty pause range {min:?}..={max:?}"
            ))),
            Self::Poisson { rate } if !(rate.is_finite() && *rate > 0.) => Err(
                NodeError::Config(format!("request rate must be positive, got {rate}")),
            ),
            _ => Ok(()),
        }
    }
}

/// Draws pauses from a [`Schedule`].
pub struct Pacer<R: Rng + ?Sized> {
    pub schedule: Schedule,
    pub rng: Box<R>,
}

impl Pacer<SmallRng> {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            rng: Box::new(SmallRng::from_os_rng()),
        }
    }

    pub fn seeded(schedule: Schedule, seed: u64) -> Self {
        Self {
            schedule,
            rng: Box::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl<R: Rng + ?Sized> Pacer<R> {
    pub fn next_pause(&mut self) -> Duration {
        match self.schedule {
            Schedule::Uniform { min, max } => {
                let (min, max) = (min.as_millis() as u64, max.as_millis() as u64);
                Duration::from_millis(self.rng.random_range(min..=max.max(min)))
            }
            Schedule::Poisson { rate } => {
                let seconds = (1.0f64 - self.rng.random::<f64>()).ln().abs() / rate;
                // Tiny rates give pauses longer than a `Duration` holds.
                Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
            }
        }
    }
}
