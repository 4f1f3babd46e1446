use crate::{
    CoreResult, RpcError, WaveError,
    service::{
        AuthorizationInfo, AuthorizationIntent, OutputListener, RecipeId, ServiceBinder,
        ServiceLink, WaveService,
    },
};

use std::{panic::Location, sync::Arc};

use error_location::ErrorLocation;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Binding to the external service process.
pub struct ServiceConnection {
    service: Arc<dyn WaveService>,
    alive: watch::Receiver<bool>,
}

impl ServiceConnection {
    /// Whether the service still reports the binding as up.
    pub fn is_alive(&self) -> bool {
        // A dropped sender means the service process is gone.
        self.alive.has_changed().is_ok() && *self.alive.borrow()
    }
}

/// Owns the single connection to the sensor service and wraps every remote
/// call with a uniform failure mode.
///
/// A connection is held iff the handle is connected. Any call that observes
/// [`RpcError::Disconnected`] drops the connection before returning
/// [`WaveError::ConnectionLost`].
pub struct RemoteServiceHandle {
    api_key: String,
    binder: Arc<dyn ServiceBinder>,
    connection: Option<ServiceConnection>,
}

impl RemoteServiceHandle {
    /// Creates a disconnected handle that calls the service as `api_key`.
    pub fn new(api_key: impl Into<String>, binder: Arc<dyn ServiceBinder>) -> Self {
        Self {
            api_key: api_key.into(),
            binder,
            connection: None,
        }
    }

    /// Binds the service. Returns the existing connection if already bound.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the service cannot be found or started.
    #[instrument(skip(self))]
    pub async fn connect(&mut self) -> CoreResult<&ServiceConnection> {
        if self.connection.as_ref().is_some_and(ServiceConnection::is_alive) {
            debug!("Already connected to sensor service");
        } else {
            let ServiceLink { service, alive } =
                self.binder
                    .bind()
                    .await
                    .map_err(|e| WaveError::ServiceUnavailable {
                        reason: e.to_string(),
                        location: ErrorLocation::from(Location::caller()),
                    })?;

            if !*alive.borrow() {
                return Err(WaveError::ServiceUnavailable {
                    reason: "service went away while binding".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }

            self.connection = Some(ServiceConnection { service, alive });
            info!("Connected to sensor service");
        }

        self.connection.as_ref().ok_or_else(WaveError::connection_lost)
    }

    /// Drops the connection. Idempotent.
    #[instrument(skip(self))]
    pub fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            info!("Disconnected from sensor service");
        }
    }

    /// Whether a connection is held.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Resolves once the bound service reports the binding as down.
    ///
    /// Never resolves while disconnected. Cancel safe.
    pub async fn disconnected(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return std::future::pending().await;
        };

        loop {
            let alive = *connection.alive.borrow_and_update();
            if !alive {
                return;
            }
            // A dropped sender means the service process is gone.
            if connection.alive.changed().await.is_err() {
                return;
            }
        }
    }

    /// Asks whether the recipe is already authorized.
    #[instrument(skip_all, fields(recipe_id = %recipe_id))]
    pub async fn is_authorized(&mut self, recipe_id: &RecipeId) -> CoreResult<bool> {
        let service = self.service()?;
        let result = service.is_authorized(&self.api_key, recipe_id).await;
        self.settle("isAuthorized", result)
    }

    /// Fetches the descriptor of the external authorization flow. Does not
    /// launch anything.
    #[instrument(skip_all, fields(recipe_id = %recipe_id))]
    pub async fn authorization_request(
        &mut self,
        recipe_id: &RecipeId,
    ) -> CoreResult<AuthorizationIntent> {
        let service = self.service()?;
        let result = service.authorization_intent(recipe_id, &self.api_key).await;
        self.settle("getAuthorizationIntent", result)
    }

    /// Fetches the metadata of an authorized recipe.
    #[instrument(skip_all, fields(recipe_id = %recipe_id))]
    pub async fn fetch_authorization_info(
        &mut self,
        recipe_id: &RecipeId,
    ) -> CoreResult<AuthorizationInfo> {
        let service = self.service()?;
        let result = service.authorization_info(&self.api_key, recipe_id).await;
        self.settle("retrieveAuthorizationInfo", result)
    }

    /// Registers the output listener. `Ok(false)` means the service declined.
    #[instrument(skip_all, fields(recipe_id = %recipe_id))]
    pub async fn register_listener(
        &mut self,
        recipe_id: &RecipeId,
        listener: OutputListener,
    ) -> CoreResult<bool> {
        let service = self.service()?;
        let result = service
            .register_output_listener(&self.api_key, recipe_id, listener)
            .await;
        self.settle("registerRecipeOutputListener", result)
    }

    /// Unregisters the output listener. Best effort: callers must not treat
    /// a failure here as fatal.
    #[instrument(skip_all, fields(recipe_id = %recipe_id))]
    pub async fn unregister_listener(&mut self, recipe_id: &RecipeId) -> CoreResult<()> {
        let service = self.service()?;
        let result = service
            .unregister_output_listener(&self.api_key, recipe_id)
            .await;
        self.settle("unregisterRecipeOutputListener", result)
    }

    #[track_caller]
    fn service(&mut self) -> CoreResult<Arc<dyn WaveService>> {
        let Some(connection) = self.connection.as_ref() else {
            return Err(WaveError::connection_lost());
        };

        if connection.is_alive() {
            return Ok(Arc::clone(&connection.service));
        }

        warn!("Sensor service link is down");
        self.connection = None;
        Err(WaveError::connection_lost())
    }

    #[track_caller]
    fn settle<T>(&mut self, operation: &'static str, result: Result<T, RpcError>) -> CoreResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(RpcError::Disconnected) => {
                warn!(operation, "Lost connection to sensor service");
                self.connection = None;
                Err(WaveError::from_rpc(operation, RpcError::Disconnected))
            }
            Err(e) => {
                warn!(operation, error = %e, "Remote call failed");
                Err(WaveError::from_rpc(operation, e))
            }
        }
    }
}
