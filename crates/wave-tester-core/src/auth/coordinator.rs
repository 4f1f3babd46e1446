//! Authorization negotiation for one recipe at a time.
//!
//! A recipe is either authorized right away or handed to an external flow.
//! The flow may take arbitrarily long; its answer is correlated by request id
//! through a single-slot completion channel, so at most one external request
//! is ever in flight.

use crate::{
    AuthorizationFlow, AuthorizationOutcome, AuthorizationReplier, AuthorizationState, CoreResult,
    RemoteServiceHandle, WaveError,
    service::RecipeId,
};

use std::{
    panic::Location,
    sync::{Arc, Mutex, MutexGuard},
};

use error_location::ErrorLocation;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

struct InFlight {
    request_id: Uuid,
    recipe_id: RecipeId,
    reply: oneshot::Sender<AuthorizationOutcome>,
}

#[derive(Default)]
pub(crate) struct Ledger {
    state: AuthorizationState,
    in_flight: Option<InFlight>,
}

fn lock(ledger: &Mutex<Ledger>) -> MutexGuard<'_, Ledger> {
    ledger.lock().unwrap_or_else(|e| {
        error!("Authorization ledger lock poisoned, recovering: {}", e);
        e.into_inner()
    })
}

/// Hands `outcome` to the request `request_id` if it is still in flight.
pub(crate) fn deliver(
    ledger: &Mutex<Ledger>,
    request_id: Uuid,
    outcome: AuthorizationOutcome,
) -> bool {
    let mut ledger = lock(ledger);

    let matches = ledger
        .in_flight
        .as_ref()
        .is_some_and(|in_flight| in_flight.request_id == request_id);
    if !matches {
        debug!(request_id = %request_id, ?outcome, "Discarding stale authorization result");
        return false;
    }

    let Some(in_flight) = ledger.in_flight.take() else {
        return false;
    };

    ledger.state = match outcome {
        AuthorizationOutcome::Authorized => AuthorizationState::Authorized,
        AuthorizationOutcome::Denied => AuthorizationState::Denied,
        AuthorizationOutcome::Canceled => AuthorizationState::Unknown,
    };

    info!(
        request_id = %request_id,
        recipe_id = %in_flight.recipe_id,
        ?outcome,
        "Authorization resolved"
    );

    // The waiting side may have gone away; the outcome is still recorded.
    let _ = in_flight.reply.send(outcome);
    true
}

/// First step of an authorization attempt.
pub enum AuthorizationStep {
    /// The service already authorized the recipe.
    Authorized,
    /// An external flow was launched; await its answer.
    Pending(PendingAuthorization),
}

/// Handle on an external authorization request in flight.
pub struct PendingAuthorization {
    request_id: Uuid,
    recipe_id: RecipeId,
    reply: oneshot::Receiver<AuthorizationOutcome>,
}

impl PendingAuthorization {
    /// Correlation id of the request.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Recipe being authorized.
    pub fn recipe_id(&self) -> &RecipeId {
        &self.recipe_id
    }

    /// Waits for the external answer. There is no timeout.
    ///
    /// Cancel safe. Must not be polled again after it returned.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionLost` if the request was abandoned because the run
    /// was aborted.
    pub async fn outcome(&mut self) -> CoreResult<AuthorizationOutcome> {
        (&mut self.reply).await.map_err(|_| WaveError::ConnectionLost {
            location: ErrorLocation::from(Location::caller()),
        })
    }
}

/// Drives "is this recipe authorized?" and the external hand-off.
pub struct AuthorizationCoordinator {
    flow: Arc<dyn AuthorizationFlow>,
    ledger: Arc<Mutex<Ledger>>,
}

impl AuthorizationCoordinator {
    /// Creates a coordinator that launches `flow` when approval is needed.
    pub fn new(flow: Arc<dyn AuthorizationFlow>) -> Self {
        Self {
            flow,
            ledger: Arc::new(Mutex::new(Ledger::default())),
        }
    }

    /// Current authorization state.
    pub fn state(&self) -> AuthorizationState {
        lock(&self.ledger).state
    }

    /// Id of the external request in flight, if any.
    pub fn pending_request(&self) -> Option<Uuid> {
        lock(&self.ledger)
            .in_flight
            .as_ref()
            .map(|in_flight| in_flight.request_id)
    }

    /// Ensures `recipe_id` is authorized, suspending on the external flow if
    /// needed.
    ///
    /// # Errors
    ///
    /// See [`begin`](Self::begin) and [`PendingAuthorization::outcome`].
    #[instrument(skip_all, fields(recipe_id = %recipe_id))]
    pub async fn ensure_authorized(
        &self,
        service: &mut RemoteServiceHandle,
        recipe_id: &RecipeId,
    ) -> CoreResult<AuthorizationOutcome> {
        match self.begin(service, recipe_id).await? {
            AuthorizationStep::Authorized => Ok(AuthorizationOutcome::Authorized),
            AuthorizationStep::Pending(mut pending) => pending.outcome().await,
        }
    }

    /// Queries the service and, if the recipe is not authorized yet, launches
    /// the external flow without waiting for it.
    ///
    /// # Errors
    ///
    /// - `AuthorizationInProgress` if another external request is in flight
    /// - `AuthorizationFlowUnavailable` if the flow cannot be launched
    /// - `ConnectionLost` / `RpcFailure` from the remote calls
    #[instrument(skip_all, fields(recipe_id = %recipe_id))]
    pub async fn begin(
        &self,
        service: &mut RemoteServiceHandle,
        recipe_id: &RecipeId,
    ) -> CoreResult<AuthorizationStep> {
        self.reject_if_in_flight()?;
        lock(&self.ledger).state = AuthorizationState::Unknown;

        if service.is_authorized(recipe_id).await? {
            lock(&self.ledger).state = AuthorizationState::Authorized;
            info!("Recipe already authorized");
            return Ok(AuthorizationStep::Authorized);
        }

        let intent = service.authorization_request(recipe_id).await?;

        let request_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut ledger = lock(&self.ledger);
            if let Some(in_flight) = ledger.in_flight.as_ref() {
                return Err(WaveError::AuthorizationInProgress {
                    recipe_id: in_flight.recipe_id.to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            ledger.in_flight = Some(InFlight {
                request_id,
                recipe_id: recipe_id.clone(),
                reply: reply_tx,
            });
            ledger.state = AuthorizationState::PendingExternalApproval;
        }

        let replier =
            AuthorizationReplier::new(request_id, recipe_id.clone(), Arc::downgrade(&self.ledger));

        if let Err(e) = self.flow.launch(intent, replier) {
            let mut ledger = lock(&self.ledger);
            if ledger
                .in_flight
                .as_ref()
                .is_some_and(|in_flight| in_flight.request_id == request_id)
            {
                ledger.in_flight = None;
            }
            ledger.state = AuthorizationState::Unknown;
            warn!(request_id = %request_id, error = %e, "Failed to launch authorization flow");
            return Err(WaveError::AuthorizationFlowUnavailable {
                reason: e.reason,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        info!(request_id = %request_id, "Waiting for external authorization");

        Ok(AuthorizationStep::Pending(PendingAuthorization {
            request_id,
            recipe_id: recipe_id.clone(),
            reply: reply_rx,
        }))
    }

    /// Delivers an external answer. Returns `false` and changes nothing when
    /// `request_id` is not the request in flight.
    pub fn resolve(&self, request_id: Uuid, outcome: AuthorizationOutcome) -> bool {
        deliver(&self.ledger, request_id, outcome)
    }

    /// Resolves the request in flight, if any, as cancelled by the operator.
    #[instrument(skip(self))]
    pub fn cancel(&self) -> bool {
        match self.pending_request() {
            Some(request_id) => self.resolve(request_id, AuthorizationOutcome::Canceled),
            None => false,
        }
    }

    /// Forgets the request in flight without answering it. Its waiter sees
    /// `ConnectionLost` and any later external answer is discarded.
    #[instrument(skip(self))]
    pub fn abandon(&self) -> bool {
        let mut ledger = lock(&self.ledger);
        ledger.state = AuthorizationState::Unknown;
        match ledger.in_flight.take() {
            Some(in_flight) => {
                warn!(request_id = %in_flight.request_id, "Abandoning pending authorization");
                true
            }
            None => false,
        }
    }

    #[track_caller]
    fn reject_if_in_flight(&self) -> CoreResult<()> {
        match lock(&self.ledger).in_flight.as_ref() {
            Some(in_flight) => Err(WaveError::AuthorizationInProgress {
                recipe_id: in_flight.recipe_id.to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
            None => Ok(()),
        }
    }
}
