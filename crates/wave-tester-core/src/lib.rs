//! Wave-tester Core Library
//!
//! Diagnostic client for a remote sensor-data service: connects, negotiates
//! authorization for a recipe, streams its output and reports throughput.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use wave_tester_core::{
//!     ControllerConfig, RecipeId, SimulatedAuthorizationFlow, SimulatedWaveService,
//!     SimulatorSettings, TestRunController,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = SimulatedWaveService::new(SimulatorSettings::default());
//!     let flow = SimulatedAuthorizationFlow::new(service.clone(), true);
//!     let recipe = RecipeId::from("edu.berkeley.waverecipe.passthrough.AccelerometerPassThrough");
//!
//!     let config = ControllerConfig::new("api-key", vec![recipe.clone()]);
//!     let (controller, handle, _updates) = TestRunController::new(config, Arc::new(service), Arc::new(flow));
//!     let task = tokio::spawn(controller.run());
//!
//!     let _ = handle.start_run().await;
//!     let _ = handle.select_recipe(recipe).await;
//!     tokio::time::sleep(std::time::Duration::from_secs(3)).await;
//!     let _ = handle.stop_run().await;
//!     let _ = handle.teardown().await;
//!     let _ = task.await;
//! }
//! ```

mod auth;
mod controller;
mod error;
mod service;
mod session;
mod simulator;

pub use {
    auth::{
        AuthorizationCoordinator, AuthorizationFlow, AuthorizationOutcome, AuthorizationReplier,
        AuthorizationState, AuthorizationStep, FlowError, PendingAuthorization,
    },
    controller::{
        ControllerConfig, ControllerHandle, NoticeKind, RunCommand, RunReport, RunState,
        StatusUpdate, TestRunController,
    },
    error::{Result as CoreResult, RpcError, WaveError},
    service::{
        AuthorizationInfo, AuthorizationIntent, OutputListener, RecipeId, RecipeOutput,
        RemoteServiceHandle, ServiceBinder, ServiceConnection, ServiceLink, WaveService,
    },
    session::{SessionPhase, StreamSession, StreamStats},
    simulator::{SimulatedAuthorizationFlow, SimulatedWaveService, SimulatorSettings},
};

#[cfg(test)]
mod tests;
