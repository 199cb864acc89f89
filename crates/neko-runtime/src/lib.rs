//! # Neko Runtime
//!
//! Process-wide execution and resource-pool manager for the Neko bot.
//!
//! ## Features
//!
//! - **Sized worker pools**: a CPU pool (2 × logical cores) and an I/O pool (5 × schedulable cores)
//! - **Shared network resources**: one HTTP session and one PostgreSQL pool, built lazily and exactly once
//! - **Coordinated shutdown**: every pool's teardown runs concurrently under one global deadline
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ExecutionContext                         │
//! │  run_cpu_bound · run_io_bound · acquire_http · acquire_db    │
//! └──────┬──────────────┬───────────────┬──────────────┬────────┘
//!        ▼              ▼               ▼              ▼
//! ┌────────────┐ ┌────────────┐ ┌──────────────┐ ┌─────────────┐
//! │  CPU pool  │ │  I/O pool  │ │  HTTP pool   │ │  DB pool    │
//! │  (rayon)   │ │ (blocking) │ │  (reqwest)   │ │  (sqlx)     │
//! └─────┬──────┘ └─────┬──────┘ └──────┬───────┘ └──────┬──────┘
//!       │ teardown     │               │ on first use   │
//!       ▼              ▼               ▼                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ShutdownRegistry                          │
//! │     (hooks run concurrently, bounded by one deadline)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use neko_runtime::prelude::*;
//!
//! let ctx = Arc::new(ExecutionContext::new(RuntimeConfig::from_env())?);
//!
//! let answer = ctx.run_io_bound(|| 21 * 2).await?;
//! let http = ctx.acquire_http().await?;
//! let body = http.get("https://example.com").send().await?.text().await?;
//!
//! // Once, at process exit
//! ctx.shutdown(Duration::from_secs(10)).await;
//! ```

pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod resource;
pub mod shutdown;
pub mod sizing;
pub mod telemetry;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::capability::{CpuExecutor, DbAccess, HttpAccess, IoExecutor};
    pub use crate::config::{ConfigSource, DatabaseConfig, FileConfigSource, RuntimeConfig};
    pub use crate::context::ExecutionContext;
    pub use crate::error::PoolError;
    pub use crate::resource::{HttpHandle, PooledDb};
    pub use crate::shutdown::ShutdownReport;
    pub use crate::sizing::WorkloadClass;
    pub use crate::worker::OpenMode;
}

// Re-export key types at crate root
pub use capability::{CpuExecutor, DbAccess, HttpAccess, IoExecutor};
pub use config::{
    ConfigSource, DatabaseConfig, FileConfigSource, HttpConfig, RuntimeConfig, StaticConfigSource,
};
pub use context::{ContextStats, ExecutionContext, WorkerPoolStats};
pub use error::{ConfigError, PoolError};
pub use resource::{DatabasePool, DbPoolStats, HttpHandle, HttpPool, PooledDb, SharedResource};
pub use shutdown::{ShutdownHook, ShutdownHookId, ShutdownRegistry, ShutdownReport};
pub use sizing::{size, HostParallelism, WorkloadClass};
pub use worker::{OpenMode, WorkerPool, WorkerPoolStatus};
