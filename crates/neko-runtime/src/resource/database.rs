//! Shared PostgreSQL connection pool

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::{debug, info};

use super::shared::SharedResource;
use crate::config::{ConfigSource, DatabaseConfig};
use crate::error::PoolError;
use crate::shutdown::ShutdownRegistry;

const RESOURCE: &str = "postgres-pool";

/// A connection borrowed from the shared pool
///
/// Returned to the pool when dropped, on every exit path.
pub struct PooledDb {
    conn: PoolConnection<Postgres>,
}

impl PooledDb {
    /// Give up the guard and keep the raw pool connection
    pub fn into_inner(self) -> PoolConnection<Postgres> {
        self.conn
    }
}

impl Deref for PooledDb {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledDb {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl std::fmt::Debug for PooledDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledDb").finish_non_exhaustive()
    }
}

/// Connection counts for the shared pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbPoolStats {
    /// Open connections, idle or in use
    pub size: u32,
    /// Connections ready to be borrowed
    pub idle: usize,
}

/// Lazily built PostgreSQL pool shared by every caller
///
/// Database settings are read from the config collaborator exactly once,
/// when the first caller acquires a connection.
pub struct DatabasePool {
    source: Arc<dyn ConfigSource>,
    shared: SharedResource<PgPool>,
}

impl DatabasePool {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            shared: SharedResource::new(RESOURCE),
        }
    }

    /// The shared pool, building it on first use
    pub async fn pool(&self, registry: &ShutdownRegistry) -> Result<Arc<PgPool>, PoolError> {
        self.shared
            .get_or_init(
                registry,
                || async {
                    info!(resource = RESOURCE, "Initialising PostgreSQL pool from config");
                    let config = DatabaseConfig::load(self.source.as_ref()).await?;
                    config
                        .pool_options()
                        .connect_with(config.connect_options()?)
                        .await
                        .map_err(|e| PoolError::construction(RESOURCE, e))
                },
                |pool: Arc<PgPool>| async move {
                    info!(resource = RESOURCE, "Closing PostgreSQL pool");
                    pool.close().await;
                    Ok(())
                },
            )
            .await
    }

    /// Borrow a connection, waiting at most `timeout` when given
    ///
    /// Without a timeout the pool's configured acquire timeout applies.
    /// Running out of time yields [`PoolError::ResourceExhausted`].
    pub async fn acquire(
        &self,
        registry: &ShutdownRegistry,
        timeout: Option<Duration>,
    ) -> Result<PooledDb, PoolError> {
        let pool = self.pool(registry).await?;
        debug!(resource = RESOURCE, ?timeout, "Acquiring connection");

        let conn = match timeout {
            Some(limit) => tokio::time::timeout(limit, pool.acquire())
                .await
                .map_err(|_| PoolError::ResourceExhausted {
                    resource: RESOURCE,
                    waited: limit,
                })?,
            None => pool.acquire().await,
        }
        .map_err(|e| map_acquire_error(e, pool.options().get_acquire_timeout()))?;

        Ok(PooledDb { conn })
    }

    /// Connection counts, once the pool exists
    pub fn stats(&self) -> Option<DbPoolStats> {
        self.shared.get().map(|pool| DbPoolStats {
            size: pool.size(),
            idle: pool.num_idle(),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.is_initialized()
    }
}

impl std::fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePool")
            .field("shared", &self.shared)
            .finish()
    }
}

fn map_acquire_error(err: sqlx::Error, waited: Duration) -> PoolError {
    match err {
        sqlx::Error::PoolTimedOut => PoolError::ResourceExhausted {
            resource: RESOURCE,
            waited,
        },
        sqlx::Error::PoolClosed => PoolError::ShutDown { resource: RESOURCE },
        other => PoolError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigSource;
    use crate::error::ConfigError;

    #[test]
    fn test_pool_timeout_maps_to_exhausted() {
        let err = map_acquire_error(sqlx::Error::PoolTimedOut, Duration::from_secs(3));
        match err {
            PoolError::ResourceExhausted { resource, waited } => {
                assert_eq!(resource, RESOURCE);
                assert_eq!(waited, Duration::from_secs(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_closed_pool_maps_to_shut_down() {
        let err = map_acquire_error(sqlx::Error::PoolClosed, Duration::ZERO);
        assert!(matches!(err, PoolError::ShutDown { resource: RESOURCE }));
    }

    #[tokio::test]
    async fn test_missing_config_fails_fast() {
        let registry = ShutdownRegistry::new();
        let pool = DatabasePool::new(Arc::new(StaticConfigSource::new()));

        let err = pool.acquire(&registry, None).await.unwrap_err();
        assert!(matches!(err, PoolError::Config(ConfigError::NotFound { .. })));
        assert!(!pool.is_initialized());
        assert!(pool.stats().is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_fast() {
        let registry = ShutdownRegistry::new();
        let source = StaticConfigSource::new()
            .with_entry("database", serde_yaml::from_str("max_size: 0\nhost: x\n").unwrap());
        let pool = DatabasePool::new(Arc::new(source));

        let err = pool.acquire(&registry, Some(Duration::from_secs(1))).await.unwrap_err();
        assert!(matches!(err, PoolError::Config(ConfigError::Invalid(_))));
    }
}
