use super::{connected_handle, manual_service, recipe};
use crate::{
    AuthorizationCoordinator, AuthorizationFlow, AuthorizationOutcome, AuthorizationReplier,
    AuthorizationState, AuthorizationStep, FlowError, SimulatedAuthorizationFlow, WaveError,
    service::AuthorizationIntent,
};

use std::sync::Arc;

use uuid::Uuid;

/// Flow host that closes the UI without answering.
struct DismissingFlow;

impl AuthorizationFlow for DismissingFlow {
    fn launch(
        &self,
        _intent: AuthorizationIntent,
        replier: AuthorizationReplier,
    ) -> Result<(), FlowError> {
        drop(replier);
        Ok(())
    }
}

/// WHAT: An already-authorized recipe skips the external flow
/// WHY: The user should only be asked when the service requires it
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_authorized_recipe_when_ensuring_then_authorized_without_launch() {
    // Given: A recipe the service already authorized
    let service = manual_service(true);
    let mut handle = connected_handle(&service).await;
    let flow = SimulatedAuthorizationFlow::new(service.clone(), false);
    let coordinator = AuthorizationCoordinator::new(Arc::new(flow.clone()));

    // When: Ensuring authorization
    let outcome = coordinator
        .ensure_authorized(&mut handle, &recipe())
        .await
        .unwrap();

    // Then: Authorized, no flow launched
    assert_eq!(outcome, AuthorizationOutcome::Authorized);
    assert_eq!(coordinator.state(), AuthorizationState::Authorized);
    assert_eq!(flow.launched_count(), 0);
}

/// WHAT: An unauthorized recipe suspends until the external flow approves
/// WHY: Approval is interactive and may arrive at any later time
#[tokio::test]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_unauthorized_recipe_when_flow_approves_then_authorized() {
    // Given: An unauthorized recipe and a flow awaiting the operator
    let service = manual_service(false);
    let mut handle = connected_handle(&service).await;
    let flow = SimulatedAuthorizationFlow::new(service.clone(), false);
    let coordinator = AuthorizationCoordinator::new(Arc::new(flow.clone()));

    // When: Beginning authorization and approving externally
    let step = coordinator.begin(&mut handle, &recipe()).await.unwrap();
    let AuthorizationStep::Pending(mut pending) = step else {
        panic!("expected a pending authorization");
    };
    assert_eq!(
        coordinator.state(),
        AuthorizationState::PendingExternalApproval
    );
    assert_eq!(coordinator.pending_request(), Some(pending.request_id()));
    assert!(flow.approve_next());

    // Then: The pending request resolves Authorized and the service agrees
    assert_eq!(
        pending.outcome().await.unwrap(),
        AuthorizationOutcome::Authorized
    );
    assert_eq!(coordinator.state(), AuthorizationState::Authorized);
    assert!(handle.is_authorized(&recipe()).await.unwrap());
}

/// WHAT: A denial is an outcome, not an error
/// WHY: The controller reports denial and returns to idle
#[tokio::test]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_pending_request_when_user_denies_then_denied_outcome() {
    // Given: A pending request
    let service = manual_service(false);
    let mut handle = connected_handle(&service).await;
    let flow = SimulatedAuthorizationFlow::new(service.clone(), false);
    let coordinator = AuthorizationCoordinator::new(Arc::new(flow.clone()));
    let AuthorizationStep::Pending(mut pending) =
        coordinator.begin(&mut handle, &recipe()).await.unwrap()
    else {
        panic!("expected a pending authorization");
    };

    // When: The user denies
    assert!(flow.deny_next());

    // Then: Denied, recipe still unauthorized
    assert_eq!(pending.outcome().await.unwrap(), AuthorizationOutcome::Denied);
    assert_eq!(coordinator.state(), AuthorizationState::Denied);
    assert!(!service.is_recipe_authorized(&recipe()));
}

/// WHAT: A second authorization while one is in flight is rejected
/// WHY: Only one external request may be outstanding at a time
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_request_in_flight_when_beginning_again_then_authorization_in_progress() {
    // Given: One request in flight
    let service = manual_service(false);
    let mut handle = connected_handle(&service).await;
    let flow = SimulatedAuthorizationFlow::new(service.clone(), false);
    let coordinator = AuthorizationCoordinator::new(Arc::new(flow.clone()));
    let _first = coordinator.begin(&mut handle, &recipe()).await.unwrap();

    // When: A second attempt starts
    let second = coordinator.ensure_authorized(&mut handle, &recipe()).await;

    // Then: Rejected, and only one flow was launched
    assert!(matches!(
        second,
        Err(WaveError::AuthorizationInProgress { .. })
    ));
    assert_eq!(flow.launched_count(), 1);
}

/// WHAT: A flow that goes away without answering counts as cancelled
/// WHY: A waiting run must never hang on an abandoned UI
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_flow_dropping_replier_when_awaiting_then_canceled() {
    // Given: A flow host that dismisses without answering
    let service = manual_service(false);
    let mut handle = connected_handle(&service).await;
    let coordinator = AuthorizationCoordinator::new(Arc::new(DismissingFlow));

    // When: Ensuring authorization
    let outcome = coordinator
        .ensure_authorized(&mut handle, &recipe())
        .await
        .unwrap();

    // Then: Canceled, state back to Unknown, slot free again
    assert_eq!(outcome, AuthorizationOutcome::Canceled);
    assert_eq!(coordinator.state(), AuthorizationState::Unknown);
    assert_eq!(coordinator.pending_request(), None);
}

/// WHAT: An answer arriving after the request was abandoned is ignored
/// WHY: Late results from a previous run must not leak into the next
#[tokio::test]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_abandoned_request_when_late_answer_arrives_then_discarded() {
    // Given: A pending request that gets abandoned
    let service = manual_service(false);
    let mut handle = connected_handle(&service).await;
    let flow = SimulatedAuthorizationFlow::new(service.clone(), false);
    let coordinator = AuthorizationCoordinator::new(Arc::new(flow.clone()));
    let AuthorizationStep::Pending(mut pending) =
        coordinator.begin(&mut handle, &recipe()).await.unwrap()
    else {
        panic!("expected a pending authorization");
    };
    assert!(coordinator.abandon());

    // When: The external answer arrives late
    let delivered = flow.approve_next();

    // Then: Discarded; the waiter sees ConnectionLost and state stays Unknown
    assert!(!delivered);
    assert!(matches!(
        pending.outcome().await,
        Err(WaveError::ConnectionLost { .. })
    ));
    assert_eq!(coordinator.state(), AuthorizationState::Unknown);
}

/// WHAT: Resolving with a foreign request id changes nothing
/// WHY: Results are correlated by request id
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_pending_request_when_resolving_unknown_id_then_ignored() {
    // Given: A pending request
    let service = manual_service(false);
    let mut handle = connected_handle(&service).await;
    let flow = SimulatedAuthorizationFlow::new(service.clone(), false);
    let coordinator = AuthorizationCoordinator::new(Arc::new(flow));
    let _pending = coordinator.begin(&mut handle, &recipe()).await.unwrap();

    // When: Resolving an unrelated request id
    let delivered = coordinator.resolve(Uuid::new_v4(), AuthorizationOutcome::Authorized);

    // Then: Not delivered, still pending
    assert!(!delivered);
    assert_eq!(
        coordinator.state(),
        AuthorizationState::PendingExternalApproval
    );
}

/// WHAT: A flow that cannot launch fails the attempt and frees the slot
/// WHY: A missing authorization UI must not wedge later attempts
#[tokio::test]
async fn given_unavailable_flow_when_beginning_then_flow_unavailable_and_slot_free() {
    // Given: A flow host that cannot launch
    let service = manual_service(false);
    let mut handle = connected_handle(&service).await;
    let flow = SimulatedAuthorizationFlow::new(service.clone(), false);
    flow.set_available(false);
    let coordinator = AuthorizationCoordinator::new(Arc::new(flow));

    // When: Beginning authorization
    let result = coordinator.begin(&mut handle, &recipe()).await;

    // Then: AuthorizationFlowUnavailable, nothing in flight
    assert!(matches!(
        result,
        Err(WaveError::AuthorizationFlowUnavailable { .. })
    ));
    assert_eq!(coordinator.pending_request(), None);
    assert_eq!(coordinator.state(), AuthorizationState::Unknown);
}

/// WHAT: Operator cancellation resolves the pending request as Canceled
/// WHY: Cancelling must not wait for the external UI
#[tokio::test]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_pending_request_when_cancelled_then_canceled_and_late_answer_ignored() {
    // Given: A pending request
    let service = manual_service(false);
    let mut handle = connected_handle(&service).await;
    let flow = SimulatedAuthorizationFlow::new(service.clone(), false);
    let coordinator = AuthorizationCoordinator::new(Arc::new(flow.clone()));
    let AuthorizationStep::Pending(mut pending) =
        coordinator.begin(&mut handle, &recipe()).await.unwrap()
    else {
        panic!("expected a pending authorization");
    };

    // When: The operator cancels
    assert!(coordinator.cancel());

    // Then: Canceled; the UI answering afterwards is ignored
    assert_eq!(
        pending.outcome().await.unwrap(),
        AuthorizationOutcome::Canceled
    );
    assert!(!flow.approve_next());
    assert_eq!(coordinator.state(), AuthorizationState::Unknown);
}
