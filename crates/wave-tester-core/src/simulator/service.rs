use crate::{
    RpcError,
    service::{
        AuthorizationInfo, AuthorizationIntent, OutputListener, RecipeId, RecipeOutput,
        ServiceBinder, ServiceLink, WaveService,
    },
};

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

const AUTHORIZE_ACTION: &str = "edu.berkeley.androidwave.intent.action.AUTHORIZE";

/// Behaviour of a [`SimulatedWaveService`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorSettings {
    /// Rate samples are pushed at while a listener is registered. `None`
    /// disables the pump; samples are then only sent by
    /// [`SimulatedWaveService::deliver`].
    pub output_rate_hz: Option<f64>,
    /// Rate reported through `authorization_info`.
    pub advertised_rate_hz: f64,
    /// Recipes authorized from the start.
    pub pre_authorized: Vec<RecipeId>,
    /// Whether binding succeeds.
    pub available: bool,
    /// Whether listener registration is declined.
    pub refuse_registration: bool,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            output_rate_hz: Some(50.0),
            advertised_rate_hz: 50.0,
            pre_authorized: Vec::new(),
            available: true,
            refuse_registration: false,
        }
    }
}

impl SimulatorSettings {
    /// Settings without a sample pump.
    pub fn manual() -> Self {
        Self {
            output_rate_hz: None,
            ..Self::default()
        }
    }
}

type RegistrationKey = (String, RecipeId);

struct Registration {
    listener: OutputListener,
    pump: Option<JoinHandle<()>>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

struct Inner {
    output_rate_hz: Option<f64>,
    advertised_rate_hz: f64,
    available: AtomicBool,
    refuse_registration: AtomicBool,
    failing: AtomicBool,
    authorized: Mutex<HashSet<RecipeId>>,
    registrations: Mutex<HashMap<RegistrationKey, Registration>>,
    link: Mutex<Option<watch::Sender<bool>>>,
    sequence: Arc<AtomicU64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| {
        error!("Simulator lock poisoned, recovering: {}", e);
        e.into_inner()
    })
}

/// Sensor service running inside this process.
#[derive(Clone)]
pub struct SimulatedWaveService {
    inner: Arc<Inner>,
}

impl SimulatedWaveService {
    /// Creates a simulator. Nothing is bound until [`ServiceBinder::bind`].
    pub fn new(settings: SimulatorSettings) -> Self {
        let output_rate_hz = settings
            .output_rate_hz
            .filter(|hz| hz.is_finite() && *hz > 0.0);
        if settings.output_rate_hz.is_some() && output_rate_hz.is_none() {
            warn!(
                output_rate_hz = ?settings.output_rate_hz,
                "Invalid simulator output rate, samples are delivered manually"
            );
        }

        Self {
            inner: Arc::new(Inner {
                output_rate_hz,
                advertised_rate_hz: settings.advertised_rate_hz,
                available: AtomicBool::new(settings.available),
                refuse_registration: AtomicBool::new(settings.refuse_registration),
                failing: AtomicBool::new(false),
                authorized: Mutex::new(settings.pre_authorized.into_iter().collect()),
                registrations: Mutex::new(HashMap::new()),
                link: Mutex::new(None),
                sequence: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// Marks `recipe_id` as authorized for every key.
    pub fn authorize(&self, recipe_id: &RecipeId) {
        lock(&self.inner.authorized).insert(recipe_id.clone());
    }

    /// Whether `recipe_id` is authorized.
    pub fn is_recipe_authorized(&self, recipe_id: &RecipeId) -> bool {
        lock(&self.inner.authorized).contains(recipe_id)
    }

    /// Makes future binds succeed or fail.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    /// Makes registration decline (`Ok(false)`) or accept.
    pub fn set_refuse_registration(&self, refuse: bool) {
        self.inner.refuse_registration.store(refuse, Ordering::Release);
    }

    /// Makes every call fail with [`RpcError::Failed`] without dropping the link.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::Release);
    }

    /// Simulates the service process going away.
    #[instrument(skip(self))]
    pub fn drop_connection(&self) {
        if let Some(link) = lock(&self.inner.link).take() {
            link.send_replace(false);
        }
        lock(&self.inner.registrations).clear();
        info!("Simulated service connection dropped");
    }

    /// Whether a listener for `recipe_id` is registered.
    pub fn is_registered(&self, recipe_id: &RecipeId) -> bool {
        lock(&self.inner.registrations)
            .keys()
            .any(|(_, registered)| registered == recipe_id)
    }

    /// Number of registered listeners.
    pub fn registration_count(&self) -> usize {
        lock(&self.inner.registrations).len()
    }

    /// Sends one sample to every listener registered for `recipe_id`, on the
    /// calling thread. Returns the number of listeners reached.
    pub fn deliver(&self, recipe_id: &RecipeId) -> usize {
        let listeners: Vec<OutputListener> = lock(&self.inner.registrations)
            .iter()
            .filter(|((_, registered), _)| registered == recipe_id)
            .map(|(_, registration)| Arc::clone(&registration.listener))
            .collect();

        for listener in &listeners {
            let sequence = self.inner.sequence.fetch_add(1, Ordering::AcqRel);
            listener(RecipeOutput {
                recipe_id: recipe_id.clone(),
                sequence,
                values: vec![0.0, 0.0, 9.81],
            });
        }

        listeners.len()
    }

    fn check(&self) -> Result<(), RpcError> {
        let alive = lock(&self.inner.link)
            .as_ref()
            .is_some_and(|link| *link.borrow());
        if !alive {
            return Err(RpcError::Disconnected);
        }
        if self.inner.failing.load(Ordering::Acquire) {
            return Err(RpcError::Failed {
                reason: "simulated failure".to_string(),
            });
        }
        Ok(())
    }

    fn spawn_pump(&self, recipe_id: RecipeId, listener: OutputListener) -> Option<JoinHandle<()>> {
        let hz = self.inner.output_rate_hz?;
        let sequence = Arc::clone(&self.inner.sequence);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / hz));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                listener(RecipeOutput {
                    recipe_id: recipe_id.clone(),
                    sequence: sequence.fetch_add(1, Ordering::AcqRel),
                    values: vec![0.0, 0.0, 9.81],
                });
            }
        }))
    }
}

#[async_trait]
impl WaveService for SimulatedWaveService {
    async fn is_authorized(&self, _key: &str, recipe_id: &RecipeId) -> Result<bool, RpcError> {
        self.check()?;
        Ok(self.is_recipe_authorized(recipe_id))
    }

    async fn authorization_intent(
        &self,
        recipe_id: &RecipeId,
        _key: &str,
    ) -> Result<AuthorizationIntent, RpcError> {
        self.check()?;
        Ok(AuthorizationIntent {
            recipe_id: recipe_id.clone(),
            action: AUTHORIZE_ACTION.to_string(),
        })
    }

    async fn authorization_info(
        &self,
        _key: &str,
        recipe_id: &RecipeId,
    ) -> Result<AuthorizationInfo, RpcError> {
        self.check()?;
        if !self.is_recipe_authorized(recipe_id) {
            return Err(RpcError::Failed {
                reason: format!("recipe {recipe_id} is not authorized"),
            });
        }
        Ok(AuthorizationInfo {
            recipe_id: recipe_id.clone(),
            output_max_rate_hz: self.inner.advertised_rate_hz,
        })
    }

    async fn register_output_listener(
        &self,
        key: &str,
        recipe_id: &RecipeId,
        listener: OutputListener,
    ) -> Result<bool, RpcError> {
        self.check()?;

        if self.inner.refuse_registration.load(Ordering::Acquire)
            || !self.is_recipe_authorized(recipe_id)
        {
            debug!(recipe_id = %recipe_id, "Declining listener registration");
            return Ok(false);
        }

        let pump = self.spawn_pump(recipe_id.clone(), Arc::clone(&listener));
        lock(&self.inner.registrations).insert(
            (key.to_string(), recipe_id.clone()),
            Registration { listener, pump },
        );

        debug!(recipe_id = %recipe_id, "Listener registered");
        Ok(true)
    }

    async fn unregister_output_listener(
        &self,
        key: &str,
        recipe_id: &RecipeId,
    ) -> Result<(), RpcError> {
        self.check()?;
        let removed = lock(&self.inner.registrations).remove(&(key.to_string(), recipe_id.clone()));
        if removed.is_none() {
            debug!(recipe_id = %recipe_id, "No listener to unregister");
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceBinder for SimulatedWaveService {
    async fn bind(&self) -> Result<ServiceLink, RpcError> {
        if !self.inner.available.load(Ordering::Acquire) {
            return Err(RpcError::Failed {
                reason: "no service answers the bind request".to_string(),
            });
        }

        let (link_tx, link_rx) = watch::channel(true);
        // Replacing an older link drops its sender, which its holders observe
        // as a disconnect.
        *lock(&self.inner.link) = Some(link_tx);

        info!("Simulated service bound");

        Ok(ServiceLink {
            service: Arc::new(self.clone()),
            alive: link_rx,
        })
    }
}
