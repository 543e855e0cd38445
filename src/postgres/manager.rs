use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};

use bb8::{ManageConnection, Pool};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use crate::config::PoolSettings;

/// A pooled client plus the flags that keep a dirty session out of the pool.
///
/// A client whose transaction was abandoned, or whose session state can no longer be
/// trusted, reports itself broken so bb8 closes it instead of handing it out again.
/// Closing the socket makes the server roll back and release session locks.
pub struct PgClient {
    client: Client,
    open_transaction: AtomicBool,
    discarded: AtomicBool,
}

impl PgClient {
    fn new(client: Client) -> Self {
        Self {
            client,
            open_transaction: AtomicBool::new(false),
            discarded: AtomicBool::new(false),
        }
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn set_open_transaction(&self, open: bool) {
        self.open_transaction.store(open, Ordering::SeqCst);
    }

    /// Never return this client to the pool.
    pub(crate) fn discard(&self) {
        self.discarded.store(true, Ordering::SeqCst);
    }

    fn is_reusable(&self) -> bool {
        !self.client.is_closed()
            && !self.open_transaction.load(Ordering::SeqCst)
            && !self.discarded.load(Ordering::SeqCst)
    }
}

impl Deref for PgClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

/// bb8 manager for PostgreSQL clients.
pub struct PgManager {
    config: tokio_postgres::Config,
}

impl PgManager {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self { config }
    }

    /// Build the bounded pool without opening a connection up front; an unreachable
    /// server surfaces on the first checkout.
    #[must_use]
    pub fn build_pool(self, settings: &PoolSettings) -> Pool<PgManager> {
        Pool::builder()
            .max_size(settings.max_size)
            .min_idle(Some(settings.min_idle.min(settings.max_size)))
            .connection_timeout(settings.acquire_timeout)
            .build_unchecked(self)
    }
}

impl ManageConnection for PgManager {
    type Connection = PgClient;
    type Error = tokio_postgres::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let cfg = self.config.clone();
        async move {
            debug!(hosts = ?cfg.get_hosts(), db = ?cfg.get_dbname(), "opening postgres connection");
            let (client, connection) = cfg.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!(error = %e, "postgres connection closed with error");
                }
            });
            Ok(PgClient::new(client))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.simple_query("SELECT 1").await.map(|_| ()) }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        !conn.is_reusable()
    }
}
