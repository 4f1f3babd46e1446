//! Top-level sequencing of a test run.
//!
//! Connection, authorization, streaming and teardown are driven from a single
//! task. Operator commands, the external authorization answer and the
//! service's disconnect signal are multiplexed with `tokio::select!`, so a
//! pending authorization never blocks cancellation or connection loss.

use crate::{
    AuthorizationCoordinator, AuthorizationFlow, AuthorizationOutcome, AuthorizationStep,
    ControllerHandle, CoreResult, NoticeKind, PendingAuthorization, RemoteServiceHandle,
    RunCommand, RunReport, RunState, StatusUpdate, StreamSession, WaveError,
    service::{RecipeId, ServiceBinder},
};

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Explicit configuration of a test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Key the client identifies itself with.
    pub api_key: String,
    /// Recipes the operator may choose from.
    pub recipes: Vec<RecipeId>,
}

impl ControllerConfig {
    /// Creates a configuration.
    pub fn new(api_key: impl Into<String>, recipes: Vec<RecipeId>) -> Self {
        Self {
            api_key: api_key.into(),
            recipes,
        }
    }
}

struct ActiveRun {
    session: StreamSession,
    expected_rate_hz: Option<f64>,
}

/// State machine sequencing connect, authorize, stream and report.
pub struct TestRunController {
    config: ControllerConfig,
    service: RemoteServiceHandle,
    coordinator: AuthorizationCoordinator,
    state: RunState,
    pending: Option<PendingAuthorization>,
    active: Option<ActiveRun>,
    command_rx: mpsc::Receiver<RunCommand>,
    state_tx: watch::Sender<RunState>,
    status_tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl TestRunController {
    /// Creates a controller plus its operator handle and status stream.
    pub fn new(
        config: ControllerConfig,
        binder: Arc<dyn ServiceBinder>,
        flow: Arc<dyn AuthorizationFlow>,
    ) -> (Self, ControllerHandle, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(RunState::Disconnected);
        let (status_tx, status_rx) = mpsc::unbounded_channel();

        let controller = Self {
            service: RemoteServiceHandle::new(config.api_key.clone(), binder),
            coordinator: AuthorizationCoordinator::new(flow),
            config,
            state: RunState::Disconnected,
            pending: None,
            active: None,
            command_rx,
            state_tx,
            status_tx,
        };

        (
            controller,
            ControllerHandle::new(command_tx, state_rx),
            status_rx,
        )
    }

    /// Connects, then processes commands until teardown or until every
    /// handle is dropped. A running session is stopped before returning.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> RunState {
        info!(recipes = self.config.recipes.len(), "Test run controller starting");

        self.connect().await;

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(RunCommand::Teardown) => {
                            info!("Teardown requested");
                            break;
                        }
                        Some(command) => self.handle_command(command).await,
                        None => {
                            info!("All handles dropped, tearing down");
                            break;
                        }
                    }
                }

                outcome = Self::next_outcome(&mut self.pending) => {
                    self.on_authorization_outcome(outcome).await;
                }

                _ = self.service.disconnected() => {
                    self.on_connection_lost("WaveService disconnected");
                }
            }
        }

        self.teardown().await;
        info!("Test run controller stopped");

        self.state
    }

    async fn next_outcome(
        pending: &mut Option<PendingAuthorization>,
    ) -> CoreResult<AuthorizationOutcome> {
        match pending {
            Some(pending) => pending.outcome().await,
            None => std::future::pending().await,
        }
    }

    #[instrument(skip(self))]
    async fn handle_command(&mut self, command: RunCommand) {
        debug!(state = %self.state, ?command, "Handling command");

        let state = self.state.clone();
        match (command, state) {
            (RunCommand::Connect, RunState::Disconnected) => self.connect().await,
            (RunCommand::StartRun, RunState::Connected | RunState::Reporting) => {
                self.set_state(RunState::ChoosingRecipe);
                self.emit(StatusUpdate::RecipeChoices(self.config.recipes.clone()));
            }
            (RunCommand::SelectRecipe { recipe_id }, RunState::ChoosingRecipe) => {
                if self.config.recipes.contains(&recipe_id) {
                    self.authorize(recipe_id).await;
                } else {
                    self.notice(
                        NoticeKind::RejectedCommand,
                        format!("Unknown recipe {recipe_id}"),
                    );
                }
            }
            (RunCommand::CancelAuthorization, RunState::ChoosingRecipe) => {
                self.set_state(RunState::Connected);
            }
            (RunCommand::CancelAuthorization, RunState::Authorizing { .. })
                if self.pending.is_some() =>
            {
                // Answered through the pending request like any external result.
                self.coordinator.cancel();
            }
            (RunCommand::StopRun, RunState::Running { .. }) => self.stop_session().await,
            (command, state) => {
                let message = format!("Cannot {command:?} while {state}");
                warn!(%message, "Rejected command");
                self.notice(NoticeKind::RejectedCommand, message);
            }
        }
    }

    #[instrument(skip(self))]
    async fn connect(&mut self) {
        let connected = self.service.connect().await.map(|_| ());
        match connected {
            Ok(()) => {
                self.notice(NoticeKind::Connected, "Connected to WaveService");
                self.set_state(RunState::Connected);
            }
            Err(e) => {
                error!(error = %e, "Could not bind sensor service");
                self.notice(
                    NoticeKind::ServiceUnavailable,
                    "Failed to bind to the WaveService. Is it installed? \
                     Please address this issue and restart.",
                );
                self.set_state(RunState::Disconnected);
            }
        }
    }

    #[instrument(skip(self), fields(recipe_id = %recipe_id))]
    async fn authorize(&mut self, recipe_id: RecipeId) {
        self.set_state(RunState::Authorizing {
            recipe_id: recipe_id.clone(),
        });

        match self.coordinator.begin(&mut self.service, &recipe_id).await {
            Ok(AuthorizationStep::Authorized) => self.start_session(recipe_id).await,
            Ok(AuthorizationStep::Pending(pending)) => {
                self.emit(StatusUpdate::AuthorizationPending {
                    recipe_id,
                    request_id: pending.request_id(),
                });
                self.pending = Some(pending);
            }
            Err(e) => self.fail(e),
        }
    }

    async fn on_authorization_outcome(&mut self, outcome: CoreResult<AuthorizationOutcome>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let recipe_id = pending.recipe_id().clone();

        match outcome {
            Ok(AuthorizationOutcome::Authorized) => self.start_session(recipe_id).await,
            Ok(AuthorizationOutcome::Denied) => {
                self.notice(NoticeKind::AuthorizationDenied, "Authorization Denied!");
                self.set_state(RunState::Connected);
            }
            Ok(AuthorizationOutcome::Canceled) => {
                self.notice(
                    NoticeKind::AuthorizationCanceled,
                    "Authorization process canceled.",
                );
                self.set_state(RunState::Connected);
            }
            Err(e) => self.fail(e),
        }
    }

    #[instrument(skip(self), fields(recipe_id = %recipe_id))]
    async fn start_session(&mut self, recipe_id: RecipeId) {
        let expected_rate_hz = match self.service.fetch_authorization_info(&recipe_id).await {
            Ok(info) => {
                self.emit(StatusUpdate::ExpectedRate {
                    recipe_id: recipe_id.clone(),
                    hz: info.output_max_rate_hz,
                });
                Some(info.output_max_rate_hz)
            }
            Err(e) if e.is_connection_lost() => {
                self.on_connection_lost("Lost connection to WaveService");
                return;
            }
            Err(e) => {
                // Display only; streaming does not depend on it.
                warn!(error = %e, "Could not retrieve authorization info");
                self.notice(
                    NoticeKind::RpcFailure,
                    "Could not retrieve the expected data rate",
                );
                None
            }
        };

        let mut session = StreamSession::new(recipe_id.clone());
        match session.start(&mut self.service).await {
            Ok(_) => {
                self.active = Some(ActiveRun {
                    session,
                    expected_rate_hz,
                });
                self.set_state(RunState::Running { recipe_id });
            }
            Err(e) => self.fail(e),
        }
    }

    #[instrument(skip(self))]
    async fn stop_session(&mut self) {
        let Some(mut run) = self.active.take() else {
            return;
        };

        let stats = run.session.stop(&mut self.service).await;
        let report =
            RunReport::from_stats(run.session.recipe_id().clone(), &stats, run.expected_rate_hz);

        info!(
            recipe_id = %report.recipe_id,
            sample_count = report.sample_count,
            elapsed_ms = report.elapsed.map(|elapsed| elapsed.as_millis() as u64),
            rate_hz = report.rate_hz,
            "Run finished"
        );

        self.emit(StatusUpdate::Report(report));
        self.set_state(RunState::Reporting);

        if !self.service.is_connected() {
            self.on_connection_lost("Lost connection to WaveService");
        }
    }

    #[instrument(skip(self))]
    fn on_connection_lost(&mut self, reason: &str) {
        warn!(state = %self.state, "Connection to sensor service lost");

        if self.coordinator.abandon() {
            debug!("Discarded pending authorization");
        }
        self.pending = None;

        if let Some(mut run) = self.active.take() {
            let stats = run.session.abandon();
            debug!(
                sample_count = stats.sample_count,
                "Discarded session state of aborted run"
            );
        }

        self.service.disconnect();
        self.notice(NoticeKind::ConnectionLost, reason);
        self.set_state(RunState::Disconnected);
    }

    /// Surfaces `error` once and falls back to the nearest stable state.
    fn fail(&mut self, error: WaveError) {
        if error.is_connection_lost() {
            self.on_connection_lost("Lost connection to WaveService");
            return;
        }

        warn!(error = %error, state = %self.state, "Run step failed");

        let (kind, message) = match &error {
            WaveError::RegistrationRefused { .. } => (
                NoticeKind::RegistrationRefused,
                "Error requesting recipe data stream.".to_string(),
            ),
            WaveError::AuthorizationFlowUnavailable { .. } => (
                NoticeKind::AuthorizationFailed,
                "Error launching authorization UI".to_string(),
            ),
            WaveError::AuthorizationInProgress { recipe_id, .. } => (
                NoticeKind::AuthorizationFailed,
                format!("Authorization already pending for {recipe_id}"),
            ),
            WaveError::RpcFailure {
                operation, reason, ..
            } => (
                NoticeKind::RpcFailure,
                format!("WaveService call {operation} failed: {reason}"),
            ),
            WaveError::ServiceUnavailable { reason, .. } => (
                NoticeKind::ServiceUnavailable,
                format!("WaveService unavailable: {reason}"),
            ),
            WaveError::InvalidState { reason, .. } => {
                (NoticeKind::RejectedCommand, reason.to_string())
            }
            WaveError::ConnectionLost { .. } => (
                NoticeKind::ConnectionLost,
                "Lost connection to WaveService".to_string(),
            ),
        };

        self.notice(kind, message);
        self.set_state(RunState::Connected);
    }

    async fn teardown(&mut self) {
        if matches!(self.state, RunState::Running { .. }) {
            info!("Forcing stop of running session");
            self.stop_session().await;
        }

        if self.coordinator.abandon() {
            debug!("Discarded pending authorization on teardown");
        }
        self.pending = None;

        self.service.disconnect();
        self.set_state(RunState::Disconnected);
    }

    fn set_state(&mut self, state: RunState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "State transition");
        }
        self.state = state.clone();
        self.state_tx.send_replace(state.clone());
        self.emit(StatusUpdate::State(state));
    }

    fn notice(&self, kind: NoticeKind, message: impl Into<String>) {
        self.emit(StatusUpdate::Notice {
            kind,
            message: message.into(),
        });
    }

    fn emit(&self, update: StatusUpdate) {
        // Nobody watching is fine.
        let _ = self.status_tx.send(update);
    }
}
