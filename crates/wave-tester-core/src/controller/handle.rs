use crate::{CoreResult, RunCommand, RunState, WaveError, service::RecipeId};

use std::panic::Location;

use error_location::ErrorLocation;
use tokio::sync::{mpsc, watch};

/// Operator-facing side of a [`TestRunController`](crate::TestRunController).
#[derive(Clone)]
pub struct ControllerHandle {
    command_tx: mpsc::Sender<RunCommand>,
    state_rx: watch::Receiver<RunState>,
}

impl ControllerHandle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<RunCommand>,
        state_rx: watch::Receiver<RunState>,
    ) -> Self {
        Self {
            command_tx,
            state_rx,
        }
    }

    /// Current controller state.
    pub fn state(&self) -> RunState {
        self.state_rx.borrow().clone()
    }

    /// Waits until the controller state satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the controller exited first.
    pub async fn wait_for_state(
        &mut self,
        predicate: impl FnMut(&RunState) -> bool,
    ) -> CoreResult<RunState> {
        self.state_rx
            .wait_for(predicate)
            .await
            .map(|state| state.clone())
            .map_err(|_| WaveError::InvalidState {
                reason: "test run controller has exited".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Reconnects to the service.
    pub async fn connect(&self) -> CoreResult<()> {
        self.send(RunCommand::Connect).await
    }

    /// Begins a run.
    pub async fn start_run(&self) -> CoreResult<()> {
        self.send(RunCommand::StartRun).await
    }

    /// Picks the recipe for the run being started.
    pub async fn select_recipe(&self, recipe_id: RecipeId) -> CoreResult<()> {
        self.send(RunCommand::SelectRecipe { recipe_id }).await
    }

    /// Dismisses the recipe choice or cancels a pending authorization.
    pub async fn cancel_authorization(&self) -> CoreResult<()> {
        self.send(RunCommand::CancelAuthorization).await
    }

    /// Stops the running session.
    pub async fn stop_run(&self) -> CoreResult<()> {
        self.send(RunCommand::StopRun).await
    }

    /// Stops everything and lets the controller exit.
    pub async fn teardown(&self) -> CoreResult<()> {
        self.send(RunCommand::Teardown).await
    }

    /// Sends a raw command.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the controller has exited.
    pub async fn send(&self, command: RunCommand) -> CoreResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|e| WaveError::InvalidState {
                reason: format!("test run controller has exited: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })
    }
}
