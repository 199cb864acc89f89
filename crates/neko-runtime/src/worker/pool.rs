//! Bounded worker pool for blocking work
//!
//! Runs closures off the async runtime and hands their result back to the
//! awaiting task, with a fixed upper bound on concurrent workers and a
//! draining shutdown.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{oneshot, Semaphore};
use tracing::{info, instrument, warn};

use crate::error::PoolError;
use crate::sizing::{HostParallelism, WorkloadClass, MAX_WORKERS};

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Accepting submissions
    Running,
    /// Finishing queued and in-flight work, rejecting new submissions
    Draining,
    /// All work finished, pool closed
    Stopped,
}

/// Execution medium backing a pool
enum Medium {
    /// Dedicated OS threads owned by this pool
    Dedicated(rayon::ThreadPool),
    /// The async runtime's shared blocking thread pool
    Blocking,
}

/// A fixed-size pool executing submitted closures
///
/// CPU-bound pools own a dedicated set of named OS threads. I/O-bound pools
/// borrow threads from tokio's blocking pool. In both cases a semaphore with
/// one permit per worker caps concurrency, and submissions waiting on it form
/// the pending queue. Results come back in completion order.
///
/// A submission whose awaiting future is dropped while still queued never
/// runs. Once a closure has started it always runs to completion; dropping
/// the future only abandons the wait.
pub struct WorkerPool {
    name: &'static str,
    class: WorkloadClass,
    max_workers: usize,
    permits: Arc<Semaphore>,
    medium: Medium,
    status: RwLock<WorkerPoolStatus>,
}

impl WorkerPool {
    /// Create a pool for `class` with at most `max_workers` concurrent workers
    ///
    /// A `max_workers` of zero is raised to one, and anything above
    /// [`MAX_WORKERS`] is capped.
    pub fn new(class: WorkloadClass, max_workers: usize) -> Result<Self, PoolError> {
        let name = class.pool_name();
        if max_workers > MAX_WORKERS {
            warn!(pool = name, requested = max_workers, cap = MAX_WORKERS, "Worker count capped");
        }
        let max_workers = max_workers.clamp(1, MAX_WORKERS);

        let medium = match class {
            WorkloadClass::CpuBound => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(max_workers)
                    .thread_name(|i| format!("neko-cpu-{i}"))
                    .build()
                    .map_err(|e| PoolError::construction(name, e))?;
                Medium::Dedicated(pool)
            }
            WorkloadClass::IoBound => Medium::Blocking,
        };

        info!(pool = name, max_workers, "Made pool for up to {max_workers} workers");

        Ok(Self {
            name,
            class,
            max_workers,
            permits: Arc::new(Semaphore::new(max_workers)),
            medium,
            status: RwLock::new(WorkerPoolStatus::Running),
        })
    }

    /// Create a pool sized from the host's parallelism
    pub fn sized_for(class: WorkloadClass, host: &HostParallelism) -> Result<Self, PoolError> {
        Self::new(class, host.size(class))
    }

    /// Run `f` on a worker and await its return value
    ///
    /// A closure returning `Result<T, E>` yields `E` to the caller unchanged.
    /// A panic inside the closure becomes [`PoolError::WorkerPanicked`].
    pub async fn submit<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.status() != WorkerPoolStatus::Running {
            return Err(PoolError::ShutDown {
                resource: self.name,
            });
        }

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::ShutDown {
                resource: self.name,
            })?;

        match &self.medium {
            Medium::Dedicated(threads) => {
                let (tx, rx) = oneshot::channel();
                threads.spawn(move || {
                    let _permit = permit;
                    // Nobody is waiting any more
                    if tx.is_closed() {
                        return;
                    }
                    let _ = tx.send(panic::catch_unwind(AssertUnwindSafe(f)));
                });

                match rx.await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(payload)) => Err(PoolError::from_panic(self.name, payload)),
                    Err(_) => Err(PoolError::ShutDown {
                        resource: self.name,
                    }),
                }
            }
            Medium::Blocking => {
                let handle = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    f()
                });

                match handle.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_panic() => Err(PoolError::from_panic(self.name, e.into_panic())),
                    Err(_) => Err(PoolError::ShutDown {
                        resource: self.name,
                    }),
                }
            }
        }
    }

    /// Stop accepting work and wait for queued and in-flight work to finish
    ///
    /// Calling this again after the first call returns immediately.
    #[instrument(skip(self), fields(pool = self.name))]
    pub async fn shutdown(&self) {
        {
            let mut status = self.status.write();
            if *status != WorkerPoolStatus::Running {
                return;
            }
            *status = WorkerPoolStatus::Draining;
        }

        info!(pool = self.name, in_flight = self.in_flight(), "Killing workers");

        // Every queued or running submission holds or awaits a permit; taking
        // all of them waits those out. Closing before the permits go back
        // leaves no window for a late submitter to slip in.
        let all = u32::try_from(self.max_workers).unwrap_or(u32::MAX);
        let drained = self.permits.acquire_many(all).await;
        self.permits.close();
        drop(drained);

        *self.status.write() = WorkerPoolStatus::Stopped;
        info!(pool = self.name, "Successfully killed workers");
    }

    /// Get current status
    pub fn status(&self) -> WorkerPoolStatus {
        *self.status.read()
    }

    /// Pool name used in logs and errors
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn class(&self) -> WorkloadClass {
        self.class
    }

    /// Upper bound on concurrently running workers
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Number of submissions currently holding a worker
    pub fn in_flight(&self) -> usize {
        if self.status() == WorkerPoolStatus::Stopped {
            return 0;
        }
        self.max_workers
            .saturating_sub(self.permits.available_permits())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("max_workers", &self.max_workers)
            .field("status", &self.status())
            .finish()
    }
}
