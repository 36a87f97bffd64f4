//! Settings record and its synchronization with the backend

/// REST access to the settings endpoint
pub mod api;
/// The settings record and its defaults
pub mod record;
/// In-memory store reconciled with the backend
pub mod store;

pub use api::{FetchError, HttpSettingsApi, PersistenceError, SettingsApi};
pub use record::{CueChoice, Settings};
pub use store::{ResetConfirmation, SettingsError, SettingsStore, StoreSnapshot, RESET_WARNING};
