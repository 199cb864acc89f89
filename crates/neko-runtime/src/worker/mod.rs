//! Worker pools for blocking work
//!
//! This module provides:
//! - [`WorkerPool`] - Bounded pool that runs closures off the async runtime
//! - [`OpenMode`] / [`open_file`] - Asynchronous file handles opened through the I/O pool
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      async caller                            │
//! │          pool.submit(|| work()).await                        │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ acquire permit (pending queue)
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Semaphore (one permit per worker)                 │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │ CpuBound                      │ IoBound
//!                ▼                               ▼
//! ┌──────────────────────────┐    ┌──────────────────────────────┐
//! │  dedicated rayon threads │    │  tokio blocking thread pool  │
//! │  (2 × logical cores)     │    │  (5 × schedulable cores)     │
//! └──────────────────────────┘    └──────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use neko_runtime::worker::WorkerPool;
//! use neko_runtime::WorkloadClass;
//!
//! let pool = WorkerPool::new(WorkloadClass::IoBound, 8)?;
//! let answer = pool.submit(|| 21 * 2).await?;
//! assert_eq!(answer, 42);
//!
//! // Drains queued and in-flight work
//! pool.shutdown().await;
//! ```

mod fs;
mod pool;

pub use fs::{open_file, OpenMode};
pub use pool::{WorkerPool, WorkerPoolStatus};
