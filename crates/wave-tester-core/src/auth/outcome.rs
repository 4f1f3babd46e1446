/// Result of one authorization attempt. These are expected outcomes, not
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// The recipe may be streamed.
    Authorized,
    /// The user refused the request.
    Denied,
    /// The authorization flow was dismissed or cancelled.
    Canceled,
}

/// Authorization state of the recipe currently being negotiated.
///
/// Never persisted; recomputed per recipe per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationState {
    /// Nothing known yet, or the last attempt was cancelled.
    #[default]
    Unknown,
    /// The service reported the recipe as authorized.
    Authorized,
    /// Waiting on the external authorization flow.
    PendingExternalApproval,
    /// The user refused the request.
    Denied,
}
