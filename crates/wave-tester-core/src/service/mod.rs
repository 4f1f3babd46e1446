mod handle;
mod port;
mod recipe;

pub use {
    handle::{RemoteServiceHandle, ServiceConnection},
    port::{OutputListener, ServiceBinder, ServiceLink, WaveService},
    recipe::{AuthorizationInfo, AuthorizationIntent, RecipeId, RecipeOutput},
};
