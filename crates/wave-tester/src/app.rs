use crate::{AppError, AppResult, ConsoleCommand, config::Config};

use std::{sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{error, info, instrument, warn};
use wave_tester_core::{
    ControllerHandle, RecipeId, RunState, SimulatedAuthorizationFlow, SimulatedWaveService,
    StatusUpdate, TestRunController,
};

const HELP: &str = "Commands: start | select <index|recipe-id> | stop | cancel | approve | deny | connect | help | quit";
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Operator console.
///
/// Reads commands from stdin and prints every status update the controller
/// publishes. The controller runs in its own task.
pub struct App {
    pub(crate) handle: ControllerHandle,
    pub(crate) updates: mpsc::UnboundedReceiver<StatusUpdate>,
    pub(crate) flow: SimulatedAuthorizationFlow,
    pub(crate) recipes: Vec<RecipeId>,
    pub(crate) controller: JoinHandle<RunState>,
}

impl App {
    /// Wire the authorization flow and the controller around `service`.
    /// Spawns the controller task, so it must be called inside a runtime.
    pub(crate) fn new(config: &Config, service: SimulatedWaveService) -> Self {
        let flow = SimulatedAuthorizationFlow::new(service.clone(), false);
        flow.set_available(config.simulator.flow_available);

        let controller_config = config.controller_config();
        let recipes = controller_config.recipes.clone();

        let (controller, handle, updates) = TestRunController::new(
            controller_config,
            Arc::new(service),
            Arc::new(flow.clone()),
        );

        Self {
            handle,
            updates,
            flow,
            recipes,
            controller: tokio::spawn(controller.run()),
        }
    }

    /// Run the console on stdin.
    pub(crate) async fn run(self) -> AppResult<()> {
        self.run_with(tokio::io::stdin()).await
    }

    /// Run the console on `input` until `quit`, end of input, or a failure.
    ///
    /// Every exit path goes through shutdown, so a running session is always
    /// stopped and reported. A read or dispatch failure is returned after
    /// shutdown completes.
    #[instrument(skip_all)]
    pub(crate) async fn run_with<R>(mut self, input: R) -> AppResult<()>
    where
        R: AsyncRead + Unpin,
    {
        info!("Wave-Tester starting");
        println!("{HELP}");

        let mut lines = BufReader::new(input).lines();
        let mut failure = None;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) if line.trim().is_empty() => {}
                        Ok(Some(line)) => match line.parse::<ConsoleCommand>() {
                            Ok(ConsoleCommand::Quit) => {
                                info!("Quit requested");
                                break;
                            }
                            Ok(command) => {
                                if let Err(e) = self.dispatch(command).await {
                                    error!(error = %e, "Controller is no longer accepting commands");
                                    failure = Some(e);
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Rejected console input");
                                println!("{}", rejection(&e));
                            }
                        },
                        Ok(None) => {
                            info!("End of input, shutting down");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to read console input, shutting down");
                            failure = Some(AppError::from(e));
                            break;
                        }
                    }
                }

                Some(update) = self.updates.recv() => show(update),
            }
        }

        self.shutdown().await;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Forward one console command to the controller or the simulated flow.
    ///
    /// # Errors
    ///
    /// Returns `Core` if the controller has exited.
    pub(crate) async fn dispatch(&self, command: ConsoleCommand) -> AppResult<()> {
        match command {
            ConsoleCommand::Start => self.handle.start_run().await?,
            ConsoleCommand::Select(selector) => match selector.resolve(&self.recipes) {
                Some(recipe_id) => self.handle.select_recipe(recipe_id).await?,
                None => println!("No recipe at that position."),
            },
            ConsoleCommand::Stop => self.handle.stop_run().await?,
            ConsoleCommand::Cancel => self.handle.cancel_authorization().await?,
            ConsoleCommand::Connect => self.handle.connect().await?,
            ConsoleCommand::Approve => {
                if !self.flow.approve_next() {
                    println!("No authorization request is waiting.");
                }
            }
            ConsoleCommand::Deny => {
                if !self.flow.deny_next() {
                    println!("No authorization request is waiting.");
                }
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => {}
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn shutdown(mut self) {
        // The controller may already be gone; that is fine here.
        if let Err(e) = self.handle.teardown().await {
            warn!(error = %e, "Controller already stopped");
        }
        drop(self.handle);

        // Print whatever the teardown produced, including a forced report.
        while let Some(update) = self.updates.recv().await {
            show(update);
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.controller).await {
            Ok(Ok(state)) => info!(%state, "Wave-Tester shut down successfully"),
            Ok(Err(e)) => error!(error = ?e, "Controller task panicked"),
            Err(_) => warn!("Controller did not stop within timeout"),
        }
    }
}

fn show(update: StatusUpdate) {
    match update {
        StatusUpdate::State(state) => println!("[{state}]"),
        StatusUpdate::RecipeChoices(choices) => {
            println!("Choose a recipe (select <index|recipe-id>, cancel):");
            for (index, recipe_id) in choices.iter().enumerate() {
                println!("  {}. {}", index + 1, recipe_id);
            }
        }
        StatusUpdate::AuthorizationPending { recipe_id, .. } => {
            println!("Waiting for authorization of {recipe_id} (approve, deny, cancel)");
        }
        StatusUpdate::ExpectedRate { hz, .. } => println!("Expected data rate: {hz}Hz"),
        StatusUpdate::Notice { message, .. } => println!("{message}"),
        StatusUpdate::Report(report) => println!("\n{report}\n"),
    }
}

fn rejection(error: &AppError) -> String {
    match error {
        AppError::InvalidCommand { reason, .. } => format!("{reason}. {HELP}"),
        other => other.to_string(),
    }
}
