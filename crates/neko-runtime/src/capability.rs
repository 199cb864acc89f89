//! Capability traits for consumers
//!
//! A consumer names what it needs as trait bounds and receives the
//! [`ExecutionContext`] at construction:
//!
//! ```ignore
//! struct Translator<C> {
//!     ctx: Arc<C>,
//! }
//!
//! impl<C: HttpAccess + IoExecutor> Translator<C> {
//!     async fn translate(&self, text: &str) -> anyhow::Result<String> {
//!         let http = self.ctx.acquire_http().await?;
//!         // ...
//!     }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::PoolError;
use crate::resource::{HttpHandle, PooledDb};
use crate::worker::OpenMode;

/// Submit CPU-bound work
#[async_trait]
pub trait CpuExecutor: Send + Sync {
    async fn run_cpu_bound<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static;
}

/// Submit blocking I/O work
#[async_trait]
pub trait IoExecutor: Send + Sync {
    async fn run_io_bound<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static;

    async fn open_file(&self, path: &Path, mode: OpenMode) -> Result<tokio::fs::File, PoolError>;
}

/// Use the shared HTTP session
#[async_trait]
pub trait HttpAccess: Send + Sync {
    async fn acquire_http(&self) -> Result<HttpHandle, PoolError>;
}

/// Borrow database connections
#[async_trait]
pub trait DbAccess: Send + Sync {
    async fn acquire_db(&self, timeout: Option<Duration>) -> Result<PooledDb, PoolError>;
}

#[async_trait]
impl CpuExecutor for ExecutionContext {
    async fn run_cpu_bound<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.cpu_pool().submit(f).await
    }
}

#[async_trait]
impl IoExecutor for ExecutionContext {
    async fn run_io_bound<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.io_pool().submit(f).await
    }

    async fn open_file(&self, path: &Path, mode: OpenMode) -> Result<tokio::fs::File, PoolError> {
        crate::worker::open_file(self.io_pool(), path, mode).await
    }
}

#[async_trait]
impl HttpAccess for ExecutionContext {
    async fn acquire_http(&self) -> Result<HttpHandle, PoolError> {
        ExecutionContext::acquire_http(self).await
    }
}

#[async_trait]
impl DbAccess for ExecutionContext {
    async fn acquire_db(&self, timeout: Option<Duration>) -> Result<PooledDb, PoolError> {
        ExecutionContext::acquire_db(self, timeout).await
    }
}
