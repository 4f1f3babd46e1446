use crate::{
    CoreResult, RemoteServiceHandle, StreamStats, WaveError,
    service::{OutputListener, RecipeId, RecipeOutput},
};

use std::{
    panic::Location,
    sync::{Arc, Mutex, MutexGuard},
};

use error_location::ErrorLocation;
use tokio::time::Instant;
use tracing::{error, info, instrument, trace, warn};

/// Lifecycle of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Not started, or start was aborted.
    #[default]
    Idle,
    /// Listener registered, samples are counted.
    Running,
    /// Stop requested, unregistration not yet confirmed. Samples still count.
    Stopping,
    /// Terminal. Samples are ignored.
    Stopped,
}

#[derive(Debug, Default)]
struct Counters {
    phase: SessionPhase,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    first_sample_at: Option<Instant>,
    last_sample_at: Option<Instant>,
    sample_count: u64,
}

impl Counters {
    fn snapshot(&self) -> StreamStats {
        StreamStats {
            sample_count: self.sample_count,
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            first_sample_at: self.first_sample_at,
            last_sample_at: self.last_sample_at,
        }
    }

    fn record_sample(&mut self) -> bool {
        match self.phase {
            SessionPhase::Running | SessionPhase::Stopping => {
                // Timestamp taken under the lock so first <= last always holds.
                let now = Instant::now();
                self.sample_count += 1;
                self.last_sample_at = Some(now);
                if self.first_sample_at.is_none() {
                    self.first_sample_at = Some(now);
                }
                true
            }
            SessionPhase::Idle | SessionPhase::Stopped => false,
        }
    }
}

fn lock(counters: &Mutex<Counters>) -> MutexGuard<'_, Counters> {
    // A poisoned mutex means a callback panicked; the counters are still valid.
    counters.lock().unwrap_or_else(|e| {
        error!("Session counters lock poisoned, recovering: {}", e);
        e.into_inner()
    })
}

/// One run of data collection for a recipe.
///
/// The counters are the only state shared between the control flow and the
/// service's callback context; a single mutex serializes both.
pub struct StreamSession {
    recipe_id: RecipeId,
    counters: Arc<Mutex<Counters>>,
}

impl StreamSession {
    /// Creates an idle session for `recipe_id`.
    pub fn new(recipe_id: RecipeId) -> Self {
        Self {
            recipe_id,
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    /// Recipe streamed by this session.
    pub fn recipe_id(&self) -> &RecipeId {
        &self.recipe_id
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        lock(&self.counters).phase
    }

    /// Current counters.
    pub fn snapshot(&self) -> StreamStats {
        lock(&self.counters).snapshot()
    }

    /// Records the start time and registers the output listener.
    ///
    /// On failure the session reverts to `Idle` with no timestamps retained.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the session was already started
    /// - `RegistrationRefused` if the service declined
    /// - `RpcFailure` / `ConnectionLost` from the remote call
    #[instrument(skip_all, fields(recipe_id = %self.recipe_id))]
    pub async fn start(&mut self, service: &mut RemoteServiceHandle) -> CoreResult<StreamStats> {
        {
            let mut counters = lock(&self.counters);
            if counters.phase != SessionPhase::Idle {
                return Err(WaveError::invalid_state(format!(
                    "stream session for {} is {:?}, a new session is required",
                    self.recipe_id, counters.phase
                )));
            }
            counters.phase = SessionPhase::Running;
            counters.started_at = Some(Instant::now());
        }

        match service.register_listener(&self.recipe_id, self.listener()).await {
            Ok(true) => {
                info!("Stream session started");
                Ok(self.snapshot())
            }
            Ok(false) => {
                self.revert();
                warn!("Service refused output listener registration");
                Err(WaveError::RegistrationRefused {
                    recipe_id: self.recipe_id.to_string(),
                    location: ErrorLocation::from(Location::caller()),
                })
            }
            Err(e) => {
                self.revert();
                Err(e)
            }
        }
    }

    /// Counts one delivered sample. Returns `false` if the sample was ignored
    /// because the session is not running.
    ///
    /// Safe to call from any thread, including after [`stop`](Self::stop) was
    /// requested but before unregistration took effect; such samples count.
    pub fn on_sample(&self) -> bool {
        Self::record(&self.counters)
    }

    /// Callback to register with the service.
    pub fn listener(&self) -> OutputListener {
        let counters = Arc::clone(&self.counters);
        Arc::new(move |output: RecipeOutput| {
            if !Self::record(&counters) {
                trace!(
                    recipe_id = %output.recipe_id,
                    sequence = output.sequence,
                    "Ignoring sample outside running session"
                );
            }
        })
    }

    /// Records the stop time, unregisters the listener (best effort) and
    /// finalizes the counters.
    ///
    /// A failed unregistration is logged and otherwise ignored; statistics
    /// are finalized from whatever was received.
    #[instrument(skip_all, fields(recipe_id = %self.recipe_id))]
    pub async fn stop(&mut self, service: &mut RemoteServiceHandle) -> StreamStats {
        let registered = {
            let mut counters = lock(&self.counters);
            match counters.phase {
                SessionPhase::Running => {
                    counters.phase = SessionPhase::Stopping;
                    counters.stopped_at = Some(Instant::now());
                    true
                }
                phase => {
                    warn!(?phase, "Stop requested on a session that is not running");
                    false
                }
            }
        };

        if !registered {
            return self.snapshot();
        }

        if let Err(e) = service.unregister_listener(&self.recipe_id).await {
            warn!(error = %e, "Failed to unregister output listener, finalizing locally");
        }

        let stats = self.finalize();
        info!(sample_count = stats.sample_count, "Stream session stopped");
        stats
    }

    /// Finalizes the counters without contacting the service. Used when the
    /// connection is already gone.
    #[instrument(skip_all, fields(recipe_id = %self.recipe_id))]
    pub fn abandon(&mut self) -> StreamStats {
        {
            let mut counters = lock(&self.counters);
            if counters.phase == SessionPhase::Running {
                counters.stopped_at = Some(Instant::now());
            }
        }
        let stats = self.finalize();
        warn!(sample_count = stats.sample_count, "Stream session abandoned");
        stats
    }

    fn finalize(&mut self) -> StreamStats {
        let mut counters = lock(&self.counters);
        if counters.phase != SessionPhase::Idle {
            counters.phase = SessionPhase::Stopped;
        }
        counters.snapshot()
    }

    fn revert(&mut self) {
        *lock(&self.counters) = Counters::default();
    }

    fn record(counters: &Mutex<Counters>) -> bool {
        lock(counters).record_sample()
    }
}
