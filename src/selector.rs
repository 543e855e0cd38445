//! Decides once per process which backend is active.
//!
//! Selection never touches the network: a configured but unreachable server is only
//! discovered on the first real acquisition.

use std::sync::OnceLock;

use tracing::info;

use crate::config::DatabaseSettings;
use crate::error::DbError;
use crate::types::BackendKind;

/// Memoizes the first successful backend decision. Failed decisions are not cached.
#[derive(Debug, Default)]
pub struct BackendSelector {
    decided: OnceLock<BackendKind>,
}

impl BackendSelector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            decided: OnceLock::new(),
        }
    }

    /// Return the memoized backend, deciding from `settings` on the first call.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` when no backend is usable in this build.
    pub fn resolve(&self, settings: &DatabaseSettings) -> Result<BackendKind, DbError> {
        if let Some(kind) = self.decided.get() {
            return Ok(*kind);
        }
        let candidate = decide(settings)?;
        let mut first = false;
        let kind = *self.decided.get_or_init(|| {
            first = true;
            candidate
        });
        if first {
            info!(backend = %kind, "database backend selected");
        }
        Ok(kind)
    }

    /// The memoized decision, if one was made.
    #[must_use]
    pub fn decided(&self) -> Option<BackendKind> {
        self.decided.get().copied()
    }
}

/// Apply the selection rule without memoizing.
///
/// # Errors
/// Returns `DbError::ConfigError` when no backend is usable in this build.
pub fn decide(settings: &DatabaseSettings) -> Result<BackendKind, DbError> {
    decide_with(
        settings.networked_configured(),
        BackendKind::NetworkedServer.is_compiled_in(),
        BackendKind::EmbeddedFile.is_compiled_in(),
    )
}

fn decide_with(
    networked_configured: bool,
    postgres_available: bool,
    sqlite_available: bool,
) -> Result<BackendKind, DbError> {
    if networked_configured && postgres_available {
        return Ok(BackendKind::NetworkedServer);
    }
    if sqlite_available {
        return Ok(BackendKind::EmbeddedFile);
    }
    Err(DbError::ConfigError(if networked_configured {
        "PostgreSQL is configured but its client is not compiled in, and SQLite is unavailable"
            .to_string()
    } else {
        "no database backend available: enable the `sqlite` feature or configure POSTGRES_URL/POSTGRES_HOST with the `postgres` feature".to_string()
    }))
}

static PROCESS_SELECTOR: BackendSelector = BackendSelector::new();

pub(crate) fn process_selector() -> &'static BackendSelector {
    &PROCESS_SELECTOR
}

/// Process-wide backend decision, read from the environment on first call.
///
/// # Errors
/// Returns `DbError::ConfigError` when the environment is invalid or no backend is usable.
pub fn resolve() -> Result<BackendKind, DbError> {
    if let Some(kind) = PROCESS_SELECTOR.decided() {
        return Ok(kind);
    }
    let settings = DatabaseSettings::from_env()?;
    PROCESS_SELECTOR.resolve(&settings)
}
