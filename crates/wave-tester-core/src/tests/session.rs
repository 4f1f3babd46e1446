use super::{connected_handle, manual_service, recipe};
use crate::{
    AuthorizationCoordinator, AuthorizationInfo, AuthorizationIntent, AuthorizationOutcome,
    AuthorizationStep, OutputListener, RecipeId, RecipeOutput, RemoteServiceHandle, RpcError,
    RunReport, ServiceBinder, ServiceLink, SessionPhase, SimulatedAuthorizationFlow,
    StreamSession, StreamStats, WaveError, WaveService,
};

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::watch;

/// Service that delivers samples from inside its own register and
/// unregister calls, before they return.
#[derive(Clone)]
struct ReentrantService {
    during_register: u64,
    during_unregister: u64,
    fail_register: bool,
    listener: Arc<Mutex<Option<OutputListener>>>,
    link: Arc<watch::Sender<bool>>,
}

#[allow(clippy::unwrap_used)]
impl ReentrantService {
    fn new(during_register: u64, during_unregister: u64, fail_register: bool) -> Self {
        let (link, _) = watch::channel(true);
        Self {
            during_register,
            during_unregister,
            fail_register,
            listener: Arc::new(Mutex::new(None)),
            link: Arc::new(link),
        }
    }

    fn fire(&self, recipe_id: &RecipeId, count: u64) {
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            for sequence in 0..count {
                listener(RecipeOutput {
                    recipe_id: recipe_id.clone(),
                    sequence,
                    values: Vec::new(),
                });
            }
        }
    }

    async fn connected_handle(&self) -> RemoteServiceHandle {
        let mut handle = RemoteServiceHandle::new("test-key", Arc::new(self.clone()));
        handle.connect().await.unwrap();
        handle
    }
}

#[async_trait]
#[allow(clippy::unwrap_used)]
impl WaveService for ReentrantService {
    async fn is_authorized(&self, _key: &str, _recipe_id: &RecipeId) -> Result<bool, RpcError> {
        Ok(true)
    }

    async fn authorization_intent(
        &self,
        _recipe_id: &RecipeId,
        _key: &str,
    ) -> Result<AuthorizationIntent, RpcError> {
        Err(RpcError::Failed {
            reason: "not used".to_string(),
        })
    }

    async fn authorization_info(
        &self,
        _key: &str,
        _recipe_id: &RecipeId,
    ) -> Result<AuthorizationInfo, RpcError> {
        Err(RpcError::Failed {
            reason: "not used".to_string(),
        })
    }

    async fn register_output_listener(
        &self,
        _key: &str,
        recipe_id: &RecipeId,
        listener: OutputListener,
    ) -> Result<bool, RpcError> {
        *self.listener.lock().unwrap() = Some(listener);
        self.fire(recipe_id, self.during_register);
        if self.fail_register {
            *self.listener.lock().unwrap() = None;
            return Err(RpcError::Failed {
                reason: "registration rejected by transport".to_string(),
            });
        }
        Ok(true)
    }

    async fn unregister_output_listener(
        &self,
        _key: &str,
        recipe_id: &RecipeId,
    ) -> Result<(), RpcError> {
        self.fire(recipe_id, self.during_unregister);
        *self.listener.lock().unwrap() = None;
        Ok(())
    }
}

#[async_trait]
impl ServiceBinder for ReentrantService {
    async fn bind(&self) -> Result<ServiceLink, RpcError> {
        Ok(ServiceLink {
            service: Arc::new(self.clone()),
            alive: self.link.subscribe(),
        })
    }
}

/// WHAT: Samples delivered while running are all counted
/// WHY: The report is only as good as the count
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_running_session_when_samples_delivered_then_all_counted() {
    // Given: A started session
    let service = manual_service(true);
    let mut handle = connected_handle(&service).await;
    let mut session = StreamSession::new(recipe());
    session.start(&mut handle).await.unwrap();
    assert!(service.is_registered(&recipe()));

    // When: The service delivers 25 samples, then the session stops
    for _ in 0..25 {
        assert_eq!(service.deliver(&recipe()), 1);
    }
    let stats = session.stop(&mut handle).await;

    // Then: 25 counted, listener unregistered, session stopped
    assert_eq!(stats.sample_count, 25);
    assert_eq!(session.phase(), SessionPhase::Stopped);
    assert!(!service.is_registered(&recipe()));
}

/// WHAT: Concurrent deliveries from several threads lose no samples
/// WHY: The service calls back from its own threads
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_running_session_when_threads_deliver_concurrently_then_count_exact() {
    // Given: A started session and its listener
    let service = manual_service(true);
    let mut handle = connected_handle(&service).await;
    let mut session = StreamSession::new(recipe());
    session.start(&mut handle).await.unwrap();

    // When: 8 threads each deliver 1000 samples
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let listener = session.listener();
            thread::spawn(move || {
                for sequence in 0..1000 {
                    listener(RecipeOutput {
                        recipe_id: recipe(),
                        sequence,
                        values: Vec::new(),
                    });
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // Then: Exactly 8000 samples counted, first no later than last
    let stats = session.stop(&mut handle).await;
    assert_eq!(stats.sample_count, 8000);
    assert!(stats.first_sample_at.unwrap() <= stats.last_sample_at.unwrap());
}

/// WHAT: Ten samples 100 ms apart yield exactly 10 Hz
/// WHY: Rate is count over the start-to-stop interval
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_ten_samples_over_one_second_when_stopping_then_rate_is_ten_hz() {
    // Given: A session started at T0 on a paused clock
    let service = manual_service(true);
    let mut handle = connected_handle(&service).await;
    let mut session = StreamSession::new(recipe());
    session.start(&mut handle).await.unwrap();

    // When: A sample arrives every 100 ms and the session stops with the last
    for _ in 0..10 {
        tokio::time::advance(Duration::from_millis(100)).await;
        service.deliver(&recipe());
    }
    let stats = session.stop(&mut handle).await;
    let report = RunReport::from_stats(recipe(), &stats, None);

    // Then: 10 samples over 1 s, first sample 100 ms after start
    assert_eq!(report.sample_count, 10);
    assert_eq!(report.elapsed, Some(Duration::from_secs(1)));
    assert_eq!(report.first_sample_delay, Some(Duration::from_millis(100)));
    let rate = report.rate_hz.unwrap();
    assert!((rate - 10.0).abs() < 1e-9);
}

/// WHAT: The first sample timestamp is set once and never moves
/// WHY: First-sample delay is derived from it
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_several_samples_when_snapshotting_then_first_fixed_and_last_latest() {
    // Given: A running session
    let service = manual_service(true);
    let mut handle = connected_handle(&service).await;
    let mut session = StreamSession::new(recipe());
    session.start(&mut handle).await.unwrap();

    // When: Samples arrive at different instants
    service.deliver(&recipe());
    let first = session.snapshot().first_sample_at.unwrap();
    tokio::time::advance(Duration::from_millis(250)).await;
    service.deliver(&recipe());
    let stats = session.snapshot();

    // Then: First unchanged, last advanced
    assert_eq!(stats.first_sample_at, Some(first));
    assert_eq!(
        stats.last_sample_at.unwrap() - first,
        Duration::from_millis(250)
    );
}

/// WHAT: Stopping without samples yields an undefined rate
/// WHY: Zero samples must not be reported as a rate of zero or divide by zero
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_no_samples_when_stopping_then_rate_undefined() {
    // Given: A session that never receives a sample
    let service = manual_service(true);
    let mut handle = connected_handle(&service).await;
    let mut session = StreamSession::new(recipe());
    session.start(&mut handle).await.unwrap();

    // When: Stopping
    let stats = session.stop(&mut handle).await;
    let report = RunReport::from_stats(recipe(), &stats, None);

    // Then: Zero samples, rate undefined, no first-sample time
    assert_eq!(report.sample_count, 0);
    assert_eq!(report.rate_hz, None);
    assert_eq!(report.first_sample_delay, None);
    assert!(report.to_string().contains("undefined average rate"));
}

/// WHAT: A refused registration leaves the session idle with no timestamps
/// WHY: A failed start must not leak a half-started session
#[tokio::test]
async fn given_refusing_service_when_starting_then_registration_refused_and_idle() {
    // Given: A service that refuses to stream
    let service = manual_service(true);
    service.set_refuse_registration(true);
    let mut handle = connected_handle(&service).await;
    let mut session = StreamSession::new(recipe());

    // When: Starting
    let result = session.start(&mut handle).await;

    // Then: RegistrationRefused, Idle, nothing recorded
    assert!(matches!(
        result,
        Err(WaveError::RegistrationRefused { .. })
    ));
    assert_eq!(session.phase(), SessionPhase::Idle);
    let stats = session.snapshot();
    assert_eq!(stats.started_at, None);
    assert_eq!(stats.sample_count, 0);
}

/// WHAT: Samples arriving after stop are ignored
/// WHY: A stopped session's statistics are final
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_stopped_session_when_late_sample_arrives_then_ignored() {
    // Given: A session that counted 3 samples and stopped
    let service = manual_service(true);
    let mut handle = connected_handle(&service).await;
    let mut session = StreamSession::new(recipe());
    session.start(&mut handle).await.unwrap();
    for _ in 0..3 {
        service.deliver(&recipe());
    }
    let stats = session.stop(&mut handle).await;

    // When: A sample arrives late
    let counted = session.on_sample();

    // Then: Ignored, statistics unchanged
    assert!(!counted);
    assert_eq!(session.snapshot(), stats);
    assert_eq!(stats.sample_count, 3);
}

/// WHAT: Samples before start are ignored
/// WHY: Counting starts when the session starts
#[test]
fn given_idle_session_when_sample_arrives_then_ignored() {
    // Given: A session that was never started
    let session = StreamSession::new(recipe());

    // When: A sample arrives
    let counted = session.on_sample();

    // Then: Ignored
    assert!(!counted);
    assert_eq!(session.snapshot().sample_count, 0);
}

/// WHAT: A session cannot be started twice
/// WHY: Each run uses a fresh session
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_started_session_when_starting_again_then_invalid_state() {
    // Given: A started session
    let service = manual_service(true);
    let mut handle = connected_handle(&service).await;
    let mut session = StreamSession::new(recipe());
    session.start(&mut handle).await.unwrap();

    // When: Starting again
    let result = session.start(&mut handle).await;

    // Then: InvalidState, still running
    assert!(matches!(result, Err(WaveError::InvalidState { .. })));
    assert_eq!(session.phase(), SessionPhase::Running);
}

/// WHAT: Stopping after the service vanished still finalizes statistics
/// WHY: Unregistration is best effort; the report must not be lost
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_lost_connection_when_stopping_then_stats_finalized() {
    // Given: A running session with 4 samples whose service goes away
    let service = manual_service(true);
    let mut handle = connected_handle(&service).await;
    let mut session = StreamSession::new(recipe());
    session.start(&mut handle).await.unwrap();
    for _ in 0..4 {
        service.deliver(&recipe());
    }
    service.drop_connection();

    // When: Stopping
    let stats = session.stop(&mut handle).await;

    // Then: Finalized with the received count; the handle saw the loss
    assert_eq!(stats.sample_count, 4);
    assert!(stats.stopped_at.is_some());
    assert_eq!(session.phase(), SessionPhase::Stopped);
    assert!(!handle.is_connected());
}

/// WHAT: Authorize externally, stream samples at T0..T9, stop at T10
/// WHY: End-to-end figures must match count over the start-to-stop interval
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_external_approval_when_streaming_ten_samples_then_rate_over_start_to_stop() {
    // Given: An unauthorized recipe approved through the external flow
    let service = manual_service(false);
    let mut handle = connected_handle(&service).await;
    let flow = SimulatedAuthorizationFlow::new(service.clone(), false);
    let coordinator = AuthorizationCoordinator::new(Arc::new(flow.clone()));
    let AuthorizationStep::Pending(mut pending) =
        coordinator.begin(&mut handle, &recipe()).await.unwrap()
    else {
        panic!("expected a pending authorization");
    };
    assert!(flow.approve_next());
    assert_eq!(
        pending.outcome().await.unwrap(),
        AuthorizationOutcome::Authorized
    );

    // When: Started at T0, one sample at each of T0..T9 (100 ms apart), stop at T10
    let mut session = StreamSession::new(recipe());
    session.start(&mut handle).await.unwrap();
    for tick in 0..10 {
        if tick > 0 {
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        service.deliver(&recipe());
    }
    tokio::time::advance(Duration::from_millis(100)).await;
    let stats = session.stop(&mut handle).await;
    let report = RunReport::from_stats(recipe(), &stats, None);

    // Then: 10 samples, elapsed T10 - T0 = 1 s, rate 10 Hz
    assert_eq!(report.sample_count, 10);
    assert_eq!(report.elapsed, Some(Duration::from_secs(1)));
    assert_eq!(report.first_sample_delay, Some(Duration::ZERO));
    assert!((report.rate_hz.unwrap() - 10.0).abs() < 1e-9);
}

/// WHAT: Samples delivered while unregistration is in progress still count
/// WHY: Stop is requested before the service confirms it stopped streaming
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_stop_requested_when_samples_arrive_before_unregister_returns_then_counted() {
    // Given: A service that delivers 1 sample on register and 2 on unregister
    let service = ReentrantService::new(1, 2, false);
    let mut handle = service.connected_handle().await;
    let mut session = StreamSession::new(recipe());
    session.start(&mut handle).await.unwrap();
    assert!(session.on_sample());

    // When: Stopping
    let stats = session.stop(&mut handle).await;

    // Then: All 4 samples counted, including those in the stopping window
    assert_eq!(stats.sample_count, 4);
    assert_eq!(session.phase(), SessionPhase::Stopped);
    assert!(stats.last_sample_at.unwrap() >= stats.stopped_at.unwrap());
}

/// WHAT: A failed registration call reverts the session to idle with nothing kept
/// WHY: A sample delivered before the failure must not leak into a later report
#[tokio::test]
async fn given_register_fails_after_a_sample_when_starting_then_rpc_failure_and_reset() {
    // Given: A service that delivers a sample, then fails the registration call
    let service = ReentrantService::new(1, 0, true);
    let mut handle = service.connected_handle().await;
    let mut session = StreamSession::new(recipe());

    // When: Starting
    let result = session.start(&mut handle).await;

    // Then: RpcFailure, back to Idle, counters and timestamps cleared
    assert!(matches!(
        result,
        Err(WaveError::RpcFailure {
            operation: "registerRecipeOutputListener",
            ..
        })
    ));
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert_eq!(session.snapshot(), StreamStats::default());
    assert!(handle.is_connected());
}

/// WHAT: A failing service reverts the start without counting anything
/// WHY: Remote failures on start leave no half-started session
#[tokio::test]
async fn given_failing_service_when_starting_then_rpc_failure_and_idle() {
    // Given: A simulator that fails every call
    let service = manual_service(true);
    let mut handle = connected_handle(&service).await;
    service.set_failing(true);
    let mut session = StreamSession::new(recipe());

    // When: Starting
    let result = session.start(&mut handle).await;

    // Then: RpcFailure, Idle, default counters, nothing registered
    assert!(matches!(result, Err(WaveError::RpcFailure { .. })));
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert_eq!(session.snapshot(), StreamStats::default());
    assert!(!service.is_registered(&recipe()));
}
