mod coordinator;
mod flow;
mod outcome;

pub use {
    coordinator::{AuthorizationCoordinator, AuthorizationStep, PendingAuthorization},
    flow::{AuthorizationFlow, AuthorizationReplier, FlowError},
    outcome::{AuthorizationOutcome, AuthorizationState},
};
