mod command;
#[allow(clippy::module_inception)]
mod controller;
mod handle;
mod report;
mod run_state;
mod status;

pub use {
    command::RunCommand,
    controller::{ControllerConfig, TestRunController},
    handle::ControllerHandle,
    report::RunReport,
    run_state::RunState,
    status::{NoticeKind, StatusUpdate},
};
