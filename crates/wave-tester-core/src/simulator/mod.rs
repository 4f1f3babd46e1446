//! In-process stand-in for the sensor service and its authorization UI.
//!
//! Used by the console binary when no platform service is available, and by
//! tests to script connection loss, refusals and late answers.

mod flow;
mod service;

pub use {
    flow::SimulatedAuthorizationFlow,
    service::{SimulatedWaveService, SimulatorSettings},
};
