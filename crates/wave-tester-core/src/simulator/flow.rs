use crate::{
    AuthorizationFlow, AuthorizationOutcome, AuthorizationReplier, FlowError,
    service::AuthorizationIntent,
};

use super::SimulatedWaveService;

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use tracing::{error, info, instrument};

/// Stand-in for the interactive authorization UI.
///
/// With `auto_approve` every launch is approved on the spot. Otherwise
/// launches queue up until the operator answers with
/// [`approve_next`](Self::approve_next), [`deny_next`](Self::deny_next) or
/// [`cancel_next`](Self::cancel_next).
#[derive(Clone)]
pub struct SimulatedAuthorizationFlow {
    service: SimulatedWaveService,
    auto_approve: bool,
    available: Arc<AtomicBool>,
    launched: Arc<AtomicUsize>,
    queue: Arc<Mutex<VecDeque<AuthorizationReplier>>>,
}

impl SimulatedAuthorizationFlow {
    /// Creates a flow that authorizes recipes on `service` when approved.
    pub fn new(service: SimulatedWaveService, auto_approve: bool) -> Self {
        Self {
            service,
            auto_approve,
            available: Arc::new(AtomicBool::new(true)),
            launched: Arc::new(AtomicUsize::new(0)),
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Makes future launches succeed or fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Number of successful launches so far.
    pub fn launched_count(&self) -> usize {
        self.launched.load(Ordering::Acquire)
    }

    /// Number of launches still waiting for an answer.
    pub fn pending_count(&self) -> usize {
        self.queue().len()
    }

    /// Approves the oldest waiting request and marks its recipe authorized on
    /// the service. Returns whether the answer reached a request in flight.
    pub fn approve_next(&self) -> bool {
        let replier = self.queue().pop_front();
        match replier {
            Some(replier) => self.approve(replier),
            None => false,
        }
    }

    /// Denies the oldest waiting request.
    pub fn deny_next(&self) -> bool {
        self.answer_next(AuthorizationOutcome::Denied)
    }

    /// Backs out of the oldest waiting request.
    pub fn cancel_next(&self) -> bool {
        self.answer_next(AuthorizationOutcome::Canceled)
    }

    fn answer_next(&self, outcome: AuthorizationOutcome) -> bool {
        // Popped before resolving so the queue lock is not held across delivery.
        let replier = self.queue().pop_front();
        match replier {
            Some(replier) => {
                info!(request_id = %replier.request_id(), ?outcome, "Answering authorization");
                replier.resolve(outcome)
            }
            None => false,
        }
    }

    fn approve(&self, replier: AuthorizationReplier) -> bool {
        self.service.authorize(replier.recipe_id());
        info!(
            request_id = %replier.request_id(),
            recipe_id = %replier.recipe_id(),
            "Approving authorization"
        );
        replier.resolve(AuthorizationOutcome::Authorized)
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<AuthorizationReplier>> {
        self.queue.lock().unwrap_or_else(|e| {
            error!("Authorization queue lock poisoned, recovering: {}", e);
            e.into_inner()
        })
    }
}

impl AuthorizationFlow for SimulatedAuthorizationFlow {
    #[instrument(skip_all, fields(recipe_id = %intent.recipe_id))]
    fn launch(
        &self,
        intent: AuthorizationIntent,
        replier: AuthorizationReplier,
    ) -> Result<(), FlowError> {
        if !self.available.load(Ordering::Acquire) {
            return Err(FlowError {
                reason: format!("no activity can handle {}", intent.action),
            });
        }

        self.launched.fetch_add(1, Ordering::AcqRel);

        if self.auto_approve {
            self.approve(replier);
        } else {
            info!(request_id = %replier.request_id(), "Authorization awaiting operator");
            self.queue().push_back(replier);
        }
        Ok(())
    }
}
