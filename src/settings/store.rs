use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::api::{FetchError, PersistenceError, SettingsApi};
use super::record::Settings;

/// Text the interaction layer must show before building a [`ResetConfirmation`]
pub const RESET_WARNING: &str = "Resetting restores every setting to its default value and \
permanently deletes all transcription history. This cannot be undone.";

/// Proof that the user confirmed a destructive reset
///
/// Only obtainable through [`ResetConfirmation::acknowledge_history_loss`].
#[derive(Debug)]
pub struct ResetConfirmation {
    _private: (),
}

impl ResetConfirmation {
    /// Call only after the user accepted [`RESET_WARNING`]
    #[must_use]
    pub const fn acknowledge_history_loss() -> Self {
        Self { _private: () }
    }
}

/// Failure of a store operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// Reading the record failed
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Writing or resetting the record failed
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Point-in-time view of the store for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Latest record the backend confirmed
    pub settings: Option<Settings>,
    /// A read or write is in flight
    pub loading: bool,
    /// Message of the most recent failure, cleared by the next success
    pub last_error: Option<String>,
}

type LoadResult = Result<Settings, FetchError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

#[derive(Default)]
struct StoreState {
    inflight: Option<(u64, SharedLoad)>,
    generation: u64,
    pending_writes: usize,
    last_error: Option<String>,
}

/// Settings record reconciled with the backend
///
/// Writes never update the record optimistically: every successful
/// `update`/`reset` is followed by a `load`, so `current()` only ever holds
/// what the backend returned.
pub struct SettingsStore {
    api: Arc<dyn SettingsApi>,
    state: Mutex<StoreState>,
    current: watch::Sender<Option<Settings>>,
}

impl SettingsStore {
    /// Creates an empty store; call [`Self::load`] to populate it
    #[must_use]
    pub fn new(api: Arc<dyn SettingsApi>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            api,
            state: Mutex::new(StoreState::default()),
            current,
        }
    }

    /// Latest confirmed record
    #[must_use]
    pub fn current(&self) -> Option<Settings> {
        self.current.borrow().clone()
    }

    /// Receiver that always sees the latest confirmed record
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Settings>> {
        self.current.subscribe()
    }

    /// Record, loading flag and last error
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.lock_state();
        StoreSnapshot {
            settings: self.current(),
            loading: state.inflight.is_some() || state.pending_writes > 0,
            last_error: state.last_error.clone(),
        }
    }

    /// Whether a usable API key is configured
    #[must_use]
    pub fn api_key_configured(&self) -> bool {
        self.current.borrow().as_ref().is_some_and(Settings::has_api_key)
    }

    /// Fetches the record from the backend
    ///
    /// Calls made while a fetch is in flight share its result instead of
    /// issuing another request. On failure the previous record is kept.
    ///
    /// # Errors
    /// Returns [`FetchError`] if the backend read fails
    pub async fn load(&self) -> Result<Settings, FetchError> {
        let (id, load) = self.start_load(false);
        let result = load.await;
        self.finish_load(id, &result);
        result
    }

    /// Sends the full record, then reloads what the backend stored
    ///
    /// # Errors
    /// Returns [`SettingsError::Persistence`] if the write is rejected (the
    /// previous record is kept), or [`SettingsError::Fetch`] if the reload
    /// after a successful write fails
    pub async fn update(&self, settings: Settings) -> Result<Settings, SettingsError> {
        info!(record_key = %settings.record_key, "saving settings");
        self.begin_write();
        let written = self.api.save(&settings).await;
        self.end_write(written.as_ref().err());
        written?;

        Ok(self.reload_after_write().await?)
    }

    /// Restores defaults and deletes all history on the backend, then reloads
    ///
    /// # Errors
    /// Returns [`SettingsError::Persistence`] if the reset is rejected, or
    /// [`SettingsError::Fetch`] if the reload afterwards fails
    pub async fn reset(
        &self,
        _confirmation: ResetConfirmation,
    ) -> Result<Settings, SettingsError> {
        warn!("resetting settings and purging transcription history");
        self.begin_write();
        let reset = self.api.reset().await;
        self.end_write(reset.as_ref().err());
        reset?;

        Ok(self.reload_after_write().await?)
    }

    /// Fetch that cannot join a load started before the write
    ///
    /// The superseded load's result is discarded by [`Self::finish_load`];
    /// later `load` calls join this one.
    async fn reload_after_write(&self) -> Result<Settings, FetchError> {
        let (id, load) = self.start_load(true);
        let result = load.await;
        self.finish_load(id, &result);
        result
    }

    fn start_load(&self, supersede: bool) -> (u64, SharedLoad) {
        let mut state = self.lock_state();
        if let Some((id, load)) = &state.inflight {
            if !supersede {
                debug!(generation = id, "joining in-flight settings load");
                return (*id, load.clone());
            }
            debug!(generation = id, "superseding settings load started before write");
        }

        state.generation += 1;
        let id = state.generation;
        let api = Arc::clone(&self.api);
        let load = async move { api.fetch().await }.boxed().shared();
        state.inflight = Some((id, load.clone()));
        debug!(generation = id, "settings load started");
        (id, load)
    }

    fn finish_load(&self, id: u64, result: &LoadResult) {
        let mut state = self.lock_state();
        // Only the first waiter of this generation applies the result
        if !state.inflight.as_ref().is_some_and(|(current, _)| *current == id) {
            return;
        }
        state.inflight = None;

        match result {
            Ok(settings) => {
                state.last_error = None;
                info!(
                    record_key = %settings.record_key,
                    transcription_model = %settings.transcription_model,
                    "settings loaded"
                );
                self.current.send_replace(Some(settings.clone()));
            }
            Err(e) => {
                warn!(error = %e, "settings load failed, keeping previous record");
                state.last_error = Some(e.to_string());
            }
        }
    }

    fn begin_write(&self) {
        self.lock_state().pending_writes += 1;
    }

    fn end_write(&self, error: Option<&PersistenceError>) {
        let mut state = self.lock_state();
        state.pending_writes = state.pending_writes.saturating_sub(1);
        if let Some(e) = error {
            warn!(error = %e, "settings write failed, keeping previous record");
            state.last_error = Some(e.to_string());
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
