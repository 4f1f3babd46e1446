//! Contracts of the remote sensor service.
//!
//! The concrete transport is an external platform facility; the client only
//! depends on these traits.

use crate::{
    RpcError,
    service::{AuthorizationInfo, AuthorizationIntent, RecipeId, RecipeOutput},
};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

/// Callback the service invokes once per delivered sample.
///
/// Invoked from the transport's own execution context, concurrently with the
/// control flow that registered it.
pub type OutputListener = Arc<dyn Fn(RecipeOutput) + Send + Sync>;

/// Capability surface of a bound sensor service.
#[async_trait]
pub trait WaveService: Send + Sync {
    /// Whether `key` may stream `recipe_id` without further approval.
    async fn is_authorized(&self, key: &str, recipe_id: &RecipeId) -> Result<bool, RpcError>;

    /// Descriptor of the external flow that authorizes `recipe_id` for `key`.
    async fn authorization_intent(
        &self,
        recipe_id: &RecipeId,
        key: &str,
    ) -> Result<AuthorizationIntent, RpcError>;

    /// Metadata of an authorized recipe.
    async fn authorization_info(
        &self,
        key: &str,
        recipe_id: &RecipeId,
    ) -> Result<AuthorizationInfo, RpcError>;

    /// Starts streaming `recipe_id` to `listener`. `Ok(false)` means the
    /// service declined.
    async fn register_output_listener(
        &self,
        key: &str,
        recipe_id: &RecipeId,
        listener: OutputListener,
    ) -> Result<bool, RpcError>;

    /// Stops streaming `recipe_id` to the listener registered under `key`.
    async fn unregister_output_listener(&self, key: &str, recipe_id: &RecipeId)
    -> Result<(), RpcError>;
}

/// A live binding to a service.
pub struct ServiceLink {
    /// Capability reference of the bound service.
    pub service: Arc<dyn WaveService>,
    /// `true` while the binding is up. Flips to `false` (or the sender is
    /// dropped) when the service process goes away.
    pub alive: watch::Receiver<bool>,
}

/// Locates and binds the sensor service.
#[async_trait]
pub trait ServiceBinder: Send + Sync {
    /// Binds the service, failing if it cannot be found or started.
    async fn bind(&self) -> Result<ServiceLink, RpcError>;
}
