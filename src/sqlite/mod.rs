// Embedded backend: one rusqlite session per acquisition against a fixed file.
//
// - session: opening/closing sessions, blocking-pool execution
// - params: `SqlValue` <-> engine storage classes
// - query: row collection, rowids, table introspection

pub(crate) mod params;
pub(crate) mod query;
mod session;

pub use session::SqliteSession;
pub(crate) use session::prepare_file;
