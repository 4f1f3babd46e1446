mod client_config;
#[allow(clippy::module_inception)]
mod config;
mod simulator_config;

pub(crate) use {
    client_config::ClientConfig, config::Config, simulator_config::SimulatorConfig,
};

pub(crate) const DEFAULT_API_KEY: &str = "cdaeoicdeaoixtrchearhc,h.bmte";
pub(crate) const DEFAULT_RECIPE: &str =
    "edu.berkeley.waverecipe.passthrough.AccelerometerPassThrough";
pub(crate) const DEFAULT_OUTPUT_RATE_HZ: f64 = 50.0;

pub(crate) fn default_api_key() -> String {
    DEFAULT_API_KEY.to_string()
}

pub(crate) fn default_recipes() -> Vec<String> {
    vec![DEFAULT_RECIPE.to_string()]
}

pub(crate) fn default_output_rate_hz() -> f64 {
    DEFAULT_OUTPUT_RATE_HZ
}

pub(crate) fn default_true() -> bool {
    true
}
