//! The out-of-process authorization hand-off.

use crate::{
    AuthorizationOutcome,
    auth::coordinator::{self, Ledger},
    service::{AuthorizationIntent, RecipeId},
};

use std::sync::{Mutex, Weak};

use thiserror::Error;
use uuid::Uuid;

/// The authorization flow could not be started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct FlowError {
    /// Description of the launch failure.
    pub reason: String,
}

/// Host of the external, interactive authorization flow.
pub trait AuthorizationFlow: Send + Sync {
    /// Starts the flow described by `intent`.
    ///
    /// Must return promptly. The flow answers later, possibly much later and
    /// from another thread, through `replier`.
    fn launch(&self, intent: AuthorizationIntent, replier: AuthorizationReplier)
    -> Result<(), FlowError>;
}

/// Single-use reply slot correlated with one authorization request.
///
/// Dropping it without calling [`resolve`](Self::resolve) answers
/// [`AuthorizationOutcome::Canceled`].
pub struct AuthorizationReplier {
    request_id: Uuid,
    recipe_id: RecipeId,
    ledger: Weak<Mutex<Ledger>>,
    armed: bool,
}

impl AuthorizationReplier {
    pub(crate) fn new(request_id: Uuid, recipe_id: RecipeId, ledger: Weak<Mutex<Ledger>>) -> Self {
        Self {
            request_id,
            recipe_id,
            ledger,
            armed: true,
        }
    }

    /// Id of the request this replier answers.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Recipe the request is about.
    pub fn recipe_id(&self) -> &RecipeId {
        &self.recipe_id
    }

    /// Delivers the outcome. Returns `false` when the request is no longer
    /// in flight, in which case nothing changes.
    pub fn resolve(mut self, outcome: AuthorizationOutcome) -> bool {
        self.armed = false;
        self.deliver(outcome)
    }

    fn deliver(&self, outcome: AuthorizationOutcome) -> bool {
        match self.ledger.upgrade() {
            Some(ledger) => coordinator::deliver(&ledger, self.request_id, outcome),
            None => false,
        }
    }
}

impl Drop for AuthorizationReplier {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.deliver(AuthorizationOutcome::Canceled);
        }
    }
}
