//! Common imports for application code.

pub use crate::config::{DatabaseSettings, PoolSettings};
pub use crate::connection::{ScopedConnection, Transaction};
pub use crate::database::Database;
pub use crate::error::{DbError, ErrorClass};
pub use crate::repository::{Friendship, FriendshipStatus, Message, Repository, User};
pub use crate::results::Row;
pub use crate::schema::SchemaReport;
pub use crate::types::{BackendKind, SqlValue};
