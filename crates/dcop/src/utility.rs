//! Pluggable utility functions used to fill the problem matrices.

use crate::error::ConfigError;
use crate::world::{BlockadeState, FireState, Location};
use serde::Deserialize;
use std::str::FromStr;

/// Large finite stand-in for "infinitely good/bad". Utilities are clamped
/// to `±UTILITY_SENTINEL` so sums and differences stay well defined.
pub const UTILITY_SENTINEL: f64 = 1e12;

/// Utility of a single agent/target pairing before penalties.
pub trait UtilityFunction {
    fn fire_utility(&self, agent: Location, fire: &FireState) -> f64;

    /// `blocked_routes` is the number of fire brigade routes this blockade cuts.
    fn blockade_utility(&self, agent: Location, blockade: &BlockadeState, blocked_routes: usize)
        -> f64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilityFunctionKind {
    /// Closer is better, nothing else matters.
    Distance,
    /// Distance weighted by fire intensity/area and blockade importance.
    #[default]
    SeverityDistance,
}

impl FromStr for UtilityFunctionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "distance" => Ok(Self::Distance),
            "severity_distance" => Ok(Self::SeverityDistance),
            other => Err(ConfigError::UnknownUtilityFunction(other.to_string())),
        }
    }
}

impl UtilityFunctionKind {
    pub fn build(self, distance_unit: f64) -> Box<dyn UtilityFunction + Send + Sync> {
        match self {
            Self::Distance => Box::new(DistanceUtility { distance_unit }),
            Self::SeverityDistance => Box::new(SeverityDistanceUtility { distance_unit }),
        }
    }
}

const BASE_UTILITY: f64 = 100.0;

fn distance_factor(from: Location, to: Location, unit: f64) -> f64 {
    1.0 / (1.0 + from.distance(&to) / unit)
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceUtility {
    pub distance_unit: f64,
}

impl UtilityFunction for DistanceUtility {
    fn fire_utility(&self, agent: Location, fire: &FireState) -> f64 {
        BASE_UTILITY * distance_factor(agent, fire.location, self.distance_unit)
    }

    fn blockade_utility(&self, agent: Location, blockade: &BlockadeState, _blocked: usize) -> f64 {
        BASE_UTILITY * distance_factor(agent, blockade.location, self.distance_unit)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SeverityDistanceUtility {
    pub distance_unit: f64,
}

impl UtilityFunction for SeverityDistanceUtility {
    fn fire_utility(&self, agent: Location, fire: &FireState) -> f64 {
        // Young, intense fires in large buildings are worth the trip.
        let severity = fire.intensity.clamp(0.0, 1.0) * (1.0 + fire.area.max(0.0) / 1000.0).ln_1p();
        BASE_UTILITY * (0.25 + severity) * distance_factor(agent, fire.location, self.distance_unit)
    }

    fn blockade_utility(&self, agent: Location, blockade: &BlockadeState, blocked: usize) -> f64 {
        let importance = (1 + blocked) as f64 / (1.0 + blockade.repair_cost.max(0.0) / 100.0);
        BASE_UTILITY * importance * distance_factor(agent, blockade.location, self.distance_unit)
    }
}

/// Clamps into `±UTILITY_SENTINEL`. Callers reject non-finite values before
/// clamping; NaN passes through unchanged.
pub fn clamp_utility(value: f64) -> f64 {
    if value.is_nan() {
        value
    } else {
        value.clamp(-UTILITY_SENTINEL, UTILITY_SENTINEL)
    }
}
