//! Shared HTTP client pool

use std::ops::Deref;
use std::sync::Arc;

use tracing::info;

use super::shared::SharedResource;
use crate::config::HttpConfig;
use crate::error::PoolError;
use crate::shutdown::ShutdownRegistry;

const RESOURCE: &str = "http-pool";

/// Handle to the process-wide HTTP session
///
/// Every handle is backed by the same `reqwest::Client`, which pools its own
/// connections and is safe to use from many tasks at once.
#[derive(Clone)]
pub struct HttpHandle {
    client: Arc<reqwest::Client>,
}

impl HttpHandle {
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Whether both handles share one underlying session
    pub fn same_session(&self, other: &HttpHandle) -> bool {
        Arc::ptr_eq(&self.client, &other.client)
    }
}

impl Deref for HttpHandle {
    type Target = reqwest::Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl std::fmt::Debug for HttpHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpHandle")
            .field("session", &Arc::as_ptr(&self.client))
            .finish()
    }
}

/// Lazily built HTTP session shared by every caller
#[derive(Debug)]
pub struct HttpPool {
    config: HttpConfig,
    shared: SharedResource<reqwest::Client>,
}

impl HttpPool {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            shared: SharedResource::new(RESOURCE),
        }
    }

    /// Get the shared session, building it on first use
    pub async fn acquire(&self, registry: &ShutdownRegistry) -> Result<HttpHandle, PoolError> {
        let client = self
            .shared
            .get_or_init(
                registry,
                || async { build_client(&self.config) },
                |client: Arc<reqwest::Client>| async move {
                    info!(resource = RESOURCE, "Closing HTTP pool");
                    // Pool reference is gone; the session closes with the last handle
                    drop(client);
                    Ok(())
                },
            )
            .await?;

        Ok(HttpHandle { client })
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.is_initialized()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

fn build_client(config: &HttpConfig) -> Result<reqwest::Client, PoolError> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| PoolError::construction(RESOURCE, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_twice_shares_session() {
        let registry = ShutdownRegistry::new();
        let pool = HttpPool::new(HttpConfig::default());
        assert!(!pool.is_initialized());

        let first = pool.acquire(&registry).await.unwrap();
        let second = pool.acquire(&registry).await.unwrap();

        assert!(first.same_session(&second));
        assert!(pool.is_initialized());
        assert_eq!(registry.hook_names(), vec![RESOURCE.to_string()]);
    }

    #[tokio::test]
    async fn test_separate_pools_have_separate_sessions() {
        let registry = ShutdownRegistry::new();
        let a = HttpPool::new(HttpConfig::default()).acquire(&registry).await.unwrap();
        let b = HttpPool::new(HttpConfig::default()).acquire(&registry).await.unwrap();
        assert!(!a.same_session(&b));
    }

    #[tokio::test]
    async fn test_closed_after_shutdown() {
        let registry = ShutdownRegistry::new();
        let pool = HttpPool::new(HttpConfig::default());
        let handle = pool.acquire(&registry).await.unwrap();

        let report = registry.shutdown_all(Duration::from_secs(1)).await;
        assert!(report.is_clean());
        assert!(pool.is_closed());

        // Outstanding handles stay usable until dropped
        let _ = handle.get("http://localhost/").build().unwrap();

        let err = pool.acquire(&registry).await.unwrap_err();
        assert!(matches!(err, PoolError::ShutDown { .. }));
    }

    #[tokio::test]
    async fn test_teardown_releases_session() {
        let registry = ShutdownRegistry::new();
        let pool = HttpPool::new(HttpConfig::default());
        let handle = pool.acquire(&registry).await.unwrap();
        let session = Arc::downgrade(&handle.client);
        drop(handle);

        registry.shutdown_all(Duration::from_secs(1)).await;
        assert!(session.upgrade().is_none());
    }
}
