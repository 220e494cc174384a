//! Listener settings shared by the startup commands and the session worker.
//!
//! The resolved [`Config`] seeds the settings. Preload commands may change the
//! bind address, port, protocol and TLS material until the process reaches
//! [`GlobalPhase::Started`]; from then on the worker has taken its snapshot and
//! every change is refused.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use datastore_config::Config;
use thiserror::Error;

use crate::gate::{GlobalGate, GlobalPhase};

/// Errors raised when changing the settings.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// The process has started; the listener already uses the settings.
    #[error("datastore settings cannot change once the process is {phase:?}")]
    Frozen {
        /// Phase reported by the gate.
        phase: GlobalPhase,
    },
}

/// Configuration that stays writable until the process starts.
#[derive(Debug)]
pub struct DatastoreSettings {
    config: RwLock<Config>,
    gate: Arc<GlobalGate>,
}

impl DatastoreSettings {
    /// Seeds the settings with the resolved configuration.
    #[must_use]
    pub const fn new(config: Config, gate: Arc<GlobalGate>) -> Self {
        Self {
            config: RwLock::new(config),
            gate,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Config> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current settings.
    #[must_use]
    pub fn snapshot(&self) -> Config {
        self.read().clone()
    }

    /// Runs `view` against the current settings.
    pub fn with<R>(&self, view: impl FnOnce(&Config) -> R) -> R {
        view(&self.read())
    }

    /// Applies `change` to a copy of the settings and commits the copy when
    /// `change` succeeds.
    ///
    /// The write lock is held across the phase check and the commit, so a
    /// worker snapshot taken after startup always sees a committed change.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Frozen`] once the gate has reached
    /// [`GlobalPhase::Started`], or the error produced by `change`.
    pub fn update<E>(&self, change: impl FnOnce(&mut Config) -> Result<(), E>) -> Result<(), E>
    where
        E: From<SettingsError>,
    {
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        let phase = self.gate.phase();
        if phase >= GlobalPhase::Started {
            return Err(SettingsError::Frozen { phase }.into());
        }
        let mut candidate = current.clone();
        change(&mut candidate)?;
        *current = candidate;
        Ok(())
    }
}
