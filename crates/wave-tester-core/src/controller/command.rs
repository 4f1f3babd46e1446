use crate::service::RecipeId;

/// Operator commands accepted by the [`TestRunController`](crate::TestRunController).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunCommand {
    /// Reconnect after the connection was lost or could not be established.
    Connect,
    /// Begin a run: offer the configured recipes.
    StartRun,
    /// Pick the recipe to authorize and stream.
    SelectRecipe {
        /// One of the configured recipes.
        recipe_id: RecipeId,
    },
    /// Dismiss the recipe choice, or cancel a pending external authorization.
    CancelAuthorization,
    /// Stop the running session and report its statistics.
    StopRun,
    /// Stop everything and disconnect. The controller exits afterwards.
    Teardown,
}
