use crate::config::{default_api_key, default_recipes};

use serde::{Deserialize, Serialize};

/// Identity of the client towards the sensor service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Key the client presents on every call.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Recipes offered when a run starts.
    #[serde(default = "default_recipes")]
    pub recipes: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            recipes: default_recipes(),
        }
    }
}
