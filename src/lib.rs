//! Persistence layer for the Maksum backend.
//!
//! One code path runs against PostgreSQL in production and an embedded `SQLite` file in
//! development. The backend is chosen once per process from the environment; callers
//! borrow a [`ScopedConnection`] per operation or go through a [`Repository`].
//!
//! ```no_run
//! # async fn run() -> Result<(), maksum_db::DbError> {
//! use maksum_db::prelude::*;
//!
//! let db = Database::connect(DatabaseSettings::from_env()?).await?;
//! let report = db.ensure_schema().await?;
//! println!("{} migrations applied", report.migrations_applied.len());
//!
//! let conn = db.acquire().await?;
//! let rows = conn
//!     .query("SELECT id, username FROM users WHERE is_admin = $1", &[true.into()])
//!     .await?;
//! # drop(rows);
//! # Ok(())
//! # }
//! ```

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
compile_error!("enable at least one of the `postgres` or `sqlite` features");

pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod global;
pub mod placeholders;
pub mod prelude;
pub mod provider;
pub mod repository;
pub mod results;
pub mod schema;
pub mod selector;
pub mod translate;
pub mod types;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use config::{DatabaseSettings, DatabaseSettingsBuilder, PoolSettings};
pub use connection::{ScopedConnection, Transaction};
pub use database::Database;
pub use error::{DbError, ErrorClass};
pub use provider::{ConnectionProvider, ProviderStatus};
pub use repository::{Friendship, FriendshipStatus, Message, Repository, User};
pub use results::Row;
pub use schema::SchemaReport;
pub use selector::BackendSelector;
pub use translate::{Dialect, translate, translate_statements};
pub use types::{BackendKind, SqlValue};
