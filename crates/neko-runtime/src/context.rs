//! Execution context
//!
//! [`ExecutionContext`] owns both worker pools, both shared network pools
//! and the shutdown registry. Build one per process, share it by `Arc`, and
//! call [`ExecutionContext::shutdown`] once when the process exits.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::config::{ConfigSource, FileConfigSource, RuntimeConfig};
use crate::error::PoolError;
use crate::resource::{DatabasePool, DbPoolStats, HttpHandle, HttpPool, PooledDb};
use crate::shutdown::{ShutdownHookId, ShutdownRegistry, ShutdownReport};
use crate::sizing::{HostParallelism, WorkloadClass};
use crate::worker::{self, OpenMode, WorkerPool, WorkerPoolStatus};

/// Snapshot of one worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolStats {
    pub max_workers: usize,
    pub in_flight: usize,
    pub status: WorkerPoolStatus,
}

impl From<&WorkerPool> for WorkerPoolStats {
    fn from(pool: &WorkerPool) -> Self {
        Self {
            max_workers: pool.max_workers(),
            in_flight: pool.in_flight(),
            status: pool.status(),
        }
    }
}

/// Snapshot of every pool owned by a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStats {
    pub cpu: WorkerPoolStats,
    pub io: WorkerPoolStats,
    /// Whether the HTTP session has been built
    pub http_initialized: bool,
    /// Database pool counts, once it has been built
    pub db: Option<DbPoolStats>,
    /// Hooks waiting to run at shutdown
    pub pending_hooks: usize,
}

/// Process-wide owner of worker pools and shared resources
pub struct ExecutionContext {
    config: RuntimeConfig,
    cpu: Arc<WorkerPool>,
    io: Arc<WorkerPool>,
    http: HttpPool,
    db: DatabasePool,
    registry: ShutdownRegistry,
}

impl ExecutionContext {
    /// Build a context reading config files from `config.config_dir`
    pub fn new(config: RuntimeConfig) -> Result<Self, PoolError> {
        let source = Arc::new(FileConfigSource::new(config.config_dir.clone()));
        Self::with_config_source(config, source)
    }

    /// Build a context with an explicit config collaborator
    pub fn with_config_source(
        config: RuntimeConfig,
        source: Arc<dyn ConfigSource>,
    ) -> Result<Self, PoolError> {
        let host = HostParallelism::detect();
        let registry = ShutdownRegistry::new();

        let cpu = Arc::new(WorkerPool::new(
            WorkloadClass::CpuBound,
            config.workers_for(WorkloadClass::CpuBound, &host),
        )?);
        let io = Arc::new(WorkerPool::new(
            WorkloadClass::IoBound,
            config.workers_for(WorkloadClass::IoBound, &host),
        )?);

        for pool in [&cpu, &io] {
            let pool = Arc::clone(pool);
            registry.register(pool.name(), move || async move {
                pool.shutdown().await;
                Ok(())
            })?;
        }

        info!(
            cpu_workers = cpu.max_workers(),
            io_workers = io.max_workers(),
            schedulable_cores = host.schedulable,
            total_cores = host.total,
            "Execution context ready"
        );

        Ok(Self {
            http: HttpPool::new(config.http.clone()),
            db: DatabasePool::new(source),
            config,
            cpu,
            io,
            registry,
        })
    }

    /// Run CPU-bound `f` on the CPU pool
    pub async fn run_cpu_bound<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.cpu.submit(f).await
    }

    /// Run blocking I/O `f` on the I/O pool
    pub async fn run_io_bound<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.io.submit(f).await
    }

    /// Open a local file through the I/O pool
    pub async fn open_file(
        &self,
        path: impl AsRef<Path>,
        mode: OpenMode,
    ) -> Result<tokio::fs::File, PoolError> {
        worker::open_file(&self.io, path, mode).await
    }

    /// The shared HTTP session
    pub async fn acquire_http(&self) -> Result<HttpHandle, PoolError> {
        self.http.acquire(&self.registry).await
    }

    /// Borrow a database connection
    pub async fn acquire_db(&self, timeout: Option<Duration>) -> Result<PooledDb, PoolError> {
        self.db.acquire(&self.registry, timeout).await
    }

    /// Register an extra teardown hook to run at shutdown
    pub fn register_shutdown_hook<F, Fut>(
        &self,
        name: impl Into<String>,
        hook: F,
    ) -> Result<ShutdownHookId, PoolError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.registry.register(name, hook)
    }

    /// Tear down every registered resource, waiting at most `global_timeout`
    #[instrument(skip(self))]
    pub async fn shutdown(&self, global_timeout: Duration) -> ShutdownReport {
        let report = self.registry.shutdown_all(global_timeout).await;
        info!("Pool resources are now freed");
        report
    }

    /// [`shutdown`](Self::shutdown) with the configured deadline
    pub async fn shutdown_with_configured_timeout(&self) -> ShutdownReport {
        self.shutdown(self.config.shutdown_timeout).await
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            cpu: WorkerPoolStats::from(self.cpu.as_ref()),
            io: WorkerPoolStats::from(self.io.as_ref()),
            http_initialized: self.http.is_initialized(),
            db: self.db.stats(),
            pending_hooks: self.registry.len(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &ShutdownRegistry {
        &self.registry
    }

    pub fn cpu_pool(&self) -> &WorkerPool {
        &self.cpu
    }

    pub fn io_pool(&self) -> &WorkerPool {
        &self.io
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cpu", &self.cpu)
            .field("io", &self.io)
            .field("http", &self.http)
            .field("db", &self.db)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigSource;

    fn test_context() -> ExecutionContext {
        let config = RuntimeConfig::new().with_cpu_workers(2).with_io_workers(4);
        ExecutionContext::with_config_source(config, Arc::new(StaticConfigSource::new())).unwrap()
    }

    #[tokio::test]
    async fn test_worker_pools_register_teardown() {
        let ctx = test_context();
        assert_eq!(
            ctx.registry().hook_names(),
            vec!["cpu-pool".to_string(), "io-pool".to_string()]
        );

        let stats = ctx.stats();
        assert_eq!(stats.cpu.max_workers, 2);
        assert_eq!(stats.io.max_workers, 4);
        assert!(!stats.http_initialized);
        assert!(stats.db.is_none());
    }

    #[tokio::test]
    async fn test_http_hook_registered_on_first_acquire() {
        let ctx = test_context();
        ctx.acquire_http().await.unwrap();
        ctx.acquire_http().await.unwrap();

        assert!(ctx.stats().http_initialized);
        assert_eq!(ctx.stats().pending_hooks, 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let ctx = test_context();
        ctx.acquire_http().await.unwrap();

        let report = ctx.shutdown(Duration::from_secs(5)).await;
        assert_eq!(report.launched, 3);
        assert!(report.is_clean());

        let stats = ctx.stats();
        assert_eq!(stats.cpu.status, WorkerPoolStatus::Stopped);
        assert_eq!(stats.io.status, WorkerPoolStatus::Stopped);
        assert!(ctx.run_io_bound(|| 1).await.is_err());
        assert!(ctx.acquire_http().await.is_err());
    }
}
