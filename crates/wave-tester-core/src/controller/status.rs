use crate::{RunReport, RunState, service::RecipeId};

use uuid::Uuid;

/// Category of a human-readable notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The service was bound.
    Connected,
    /// The service could not be bound.
    ServiceUnavailable,
    /// The connection dropped; the run was aborted.
    ConnectionLost,
    /// The user refused authorization.
    AuthorizationDenied,
    /// The authorization flow was cancelled.
    AuthorizationCanceled,
    /// Authorization could not be negotiated.
    AuthorizationFailed,
    /// The service refused to stream the recipe.
    RegistrationRefused,
    /// A remote call failed.
    RpcFailure,
    /// The command is not valid in the current state.
    RejectedCommand,
}

/// Read-only updates published for display.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// The controller entered a new state.
    State(RunState),
    /// Recipes the operator may choose from.
    RecipeChoices(Vec<RecipeId>),
    /// An external authorization flow was launched.
    AuthorizationPending {
        /// Recipe awaiting approval.
        recipe_id: RecipeId,
        /// Correlation id of the request.
        request_id: Uuid,
    },
    /// Rate the service expects the recipe to emit.
    ExpectedRate {
        /// Recipe being streamed.
        recipe_id: RecipeId,
        /// Expected maximum rate in Hz.
        hz: f64,
    },
    /// A single human-readable notice.
    Notice {
        /// Category of the notice.
        kind: NoticeKind,
        /// Text to show the operator.
        message: String,
    },
    /// Final statistics of a run.
    Report(RunReport),
}
