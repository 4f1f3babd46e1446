use crate::{StreamStats, service::RecipeId};

use std::{fmt, time::Duration};

/// Statistics derived from a finished stream session.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Recipe that was streamed.
    pub recipe_id: RecipeId,
    /// Samples received.
    pub sample_count: u64,
    /// Time between start and stop.
    pub elapsed: Option<Duration>,
    /// Time between start and the first sample.
    pub first_sample_delay: Option<Duration>,
    /// Average sample rate in Hz. `None` when undefined: no samples, or no
    /// time elapsed.
    pub rate_hz: Option<f64>,
    /// Rate the service advertised for the recipe, if it could be fetched.
    pub expected_rate_hz: Option<f64>,
}

impl RunReport {
    /// Derives the report from a session snapshot.
    pub fn from_stats(
        recipe_id: RecipeId,
        stats: &StreamStats,
        expected_rate_hz: Option<f64>,
    ) -> Self {
        let elapsed = match (stats.started_at, stats.stopped_at) {
            (Some(start), Some(stop)) => Some(stop.saturating_duration_since(start)),
            _ => None,
        };

        let first_sample_delay = match (stats.started_at, stats.first_sample_at) {
            (Some(start), Some(first)) => Some(first.saturating_duration_since(start)),
            _ => None,
        };

        let rate_hz = match elapsed {
            Some(elapsed) if stats.sample_count > 0 && !elapsed.is_zero() => {
                Some(stats.sample_count as f64 / elapsed.as_secs_f64())
            }
            _ => None,
        };

        Self {
            recipe_id,
            sample_count: stats.sample_count,
            elapsed,
            first_sample_delay,
            rate_hz,
            expected_rate_hz,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Test stopped.")?;
        writeln!(f)?;
        writeln!(f, "You chose recipe {}", self.recipe_id)?;
        writeln!(f)?;

        write!(f, "{} data samples were received", self.sample_count)?;
        match self.elapsed {
            Some(elapsed) => write!(f, " in {:.3} seconds, ", elapsed.as_secs_f64())?,
            None => write!(f, " in an unknown time, ")?,
        }
        match self.rate_hz {
            Some(rate) => write!(f, "yielding an average rate of {rate:.3}Hz.")?,
            None => write!(f, "yielding an undefined average rate.")?,
        }

        if let Some(delay) = self.first_sample_delay {
            write!(
                f,
                "\nFirst sample arrived {:.3} seconds after start.",
                delay.as_secs_f64()
            )?;
        }
        if let Some(expected) = self.expected_rate_hz {
            write!(f, "\nExpected data rate: {expected}Hz")?;
        }
        Ok(())
    }
}
