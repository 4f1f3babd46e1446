mod auth;
mod session;

use crate::{RecipeId, RemoteServiceHandle, SimulatedWaveService, SimulatorSettings};

use std::sync::Arc;

const RECIPE: &str = "edu.berkeley.waverecipe.passthrough.AccelerometerPassThrough";

fn recipe() -> RecipeId {
    RecipeId::from(RECIPE)
}

/// Simulator without a sample pump; `recipe()` pre-authorized if asked.
fn manual_service(authorized: bool) -> SimulatedWaveService {
    let mut settings = SimulatorSettings::manual();
    if authorized {
        settings.pre_authorized.push(recipe());
    }
    SimulatedWaveService::new(settings)
}

#[allow(clippy::unwrap_used)]
async fn connected_handle(service: &SimulatedWaveService) -> RemoteServiceHandle {
    let mut handle = RemoteServiceHandle::new("test-key", Arc::new(service.clone()));
    handle.connect().await.unwrap();
    handle
}
