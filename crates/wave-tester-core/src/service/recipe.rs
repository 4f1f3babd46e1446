use std::fmt;

/// Opaque name of a remote sensor-processing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipeId(String);

impl RecipeId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecipeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecipeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptor of an external authorization flow, produced by the service.
///
/// The client never interprets it; it is handed as-is to an
/// [`AuthorizationFlow`](crate::AuthorizationFlow).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationIntent {
    /// Recipe the flow asks the user to authorize.
    pub recipe_id: RecipeId,
    /// Action name the flow host dispatches on.
    pub action: String,
}

/// Service-reported metadata for an authorized recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationInfo {
    /// Recipe the metadata belongs to.
    pub recipe_id: RecipeId,
    /// Maximum rate the recipe is expected to emit, in Hz.
    pub output_max_rate_hz: f64,
}

/// One unit of streamed recipe output.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeOutput {
    /// Recipe that produced the sample.
    pub recipe_id: RecipeId,
    /// Service-assigned sequence number.
    pub sequence: u64,
    /// Sample payload.
    pub values: Vec<f64>,
}
