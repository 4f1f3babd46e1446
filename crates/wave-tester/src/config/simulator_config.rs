use crate::config::{default_output_rate_hz, default_true};

use serde::{Deserialize, Serialize};
use wave_tester_core::{RecipeId, SimulatorSettings};

/// Behaviour of the in-process sensor service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Rate samples are pushed at, and the rate the service advertises.
    #[serde(default = "default_output_rate_hz")]
    pub output_rate_hz: f64,
    /// Whether the service can be bound.
    #[serde(default = "default_true")]
    pub available: bool,
    /// Recipes authorized without asking.
    #[serde(default)]
    pub pre_authorized: Vec<String>,
    /// Whether the service declines to stream.
    #[serde(default)]
    pub refuse_registration: bool,
    /// Whether the authorization UI can be launched.
    #[serde(default = "default_true")]
    pub flow_available: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            output_rate_hz: default_output_rate_hz(),
            available: true,
            pre_authorized: Vec::new(),
            refuse_registration: false,
            flow_available: true,
        }
    }
}

impl SimulatorConfig {
    /// Settings for [`wave_tester_core::SimulatedWaveService`].
    pub fn settings(&self) -> SimulatorSettings {
        SimulatorSettings {
            output_rate_hz: Some(self.output_rate_hz),
            advertised_rate_hz: self.output_rate_hz,
            pre_authorized: self
                .pre_authorized
                .iter()
                .map(|recipe| RecipeId::from(recipe.as_str()))
                .collect(),
            available: self.available,
            refuse_registration: self.refuse_registration,
        }
    }
}
