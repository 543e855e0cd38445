// Networked backend: a bb8-pooled tokio-postgres client.
//
// - manager: connection manager and pool construction
// - params: binding `SqlValue` parameters
// - query: statement execution under the command timeout, row extraction

mod manager;
mod params;
pub(crate) mod query;

pub use manager::{PgClient, PgManager};

/// The process-wide pool type for the networked backend.
pub type PgPool = bb8::Pool<PgManager>;
