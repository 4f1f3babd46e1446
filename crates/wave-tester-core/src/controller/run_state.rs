use crate::service::RecipeId;

use std::fmt;

/// Top-level state of a test run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    /// No connection to the sensor service.
    #[default]
    Disconnected,
    /// Connected and idle.
    Connected,
    /// Waiting for the operator to pick a recipe.
    ChoosingRecipe,
    /// Negotiating authorization, possibly waiting on the external flow.
    Authorizing {
        /// Recipe being authorized.
        recipe_id: RecipeId,
    },
    /// Streaming samples.
    Running {
        /// Recipe being streamed.
        recipe_id: RecipeId,
    },
    /// The last run's statistics were reported.
    Reporting,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Disconnected => f.write_str("disconnected"),
            RunState::Connected => f.write_str("connected"),
            RunState::ChoosingRecipe => f.write_str("choosing recipe"),
            RunState::Authorizing { recipe_id } => write!(f, "authorizing {recipe_id}"),
            RunState::Running { recipe_id } => write!(f, "running {recipe_id}"),
            RunState::Reporting => f.write_str("reporting"),
        }
    }
}
