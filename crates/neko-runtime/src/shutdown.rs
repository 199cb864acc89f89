//! Shutdown registry and coordinated teardown
//!
//! Every pool registers one teardown hook when it is built. At process exit
//! [`ShutdownRegistry::shutdown_all`] runs all hooks concurrently under a
//! single deadline and returns once they finish or the deadline passes,
//! whichever comes first. Hooks still running after the deadline are left
//! to finish in the background.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tracing::{error, info, instrument, warn};

use crate::error::PoolError;

/// Zero-argument asynchronous teardown callback
pub type ShutdownHook = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Handle returned by [`ShutdownRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShutdownHookId(u64);

struct RegisteredHook {
    id: ShutdownHookId,
    name: String,
    hook: ShutdownHook,
}

/// Result of a coordinated shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Hooks that were launched
    pub launched: usize,
    /// Hooks that finished successfully before the deadline
    pub completed: usize,
    /// Hooks that returned an error or panicked
    pub failed: Vec<String>,
    /// Hooks still running when the deadline passed
    pub outstanding: usize,
    /// Whether the deadline passed before every hook finished
    pub timed_out: bool,
}

impl ShutdownReport {
    /// Every launched hook finished without error before the deadline
    pub fn is_clean(&self) -> bool {
        !self.timed_out && self.failed.is_empty()
    }
}

/// Ordered collection of teardown hooks, drained exactly once
#[derive(Default)]
pub struct ShutdownRegistry {
    hooks: Mutex<Vec<RegisteredHook>>,
    next_id: AtomicU64,
    shutting_down: AtomicBool,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a teardown hook
    ///
    /// Fails with [`PoolError::ShutDown`] once shutdown has begun.
    pub fn register<F, Fut>(&self, name: impl Into<String>, hook: F) -> Result<ShutdownHookId, PoolError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut hooks = self.hooks.lock();
        // Checked under the lock so a hook cannot slip in after the drain
        if self.is_shutting_down() {
            return Err(PoolError::ShutDown {
                resource: "shutdown-registry",
            });
        }

        let id = ShutdownHookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        info!(hook = %name, "Registered shutdown hook");
        hooks.push(RegisteredHook {
            id,
            name,
            hook: Box::new(move || hook().boxed()),
        });
        Ok(id)
    }

    /// Remove a hook that has not run yet
    pub fn deregister(&self, id: ShutdownHookId) -> bool {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|h| h.id != id);
        hooks.len() != before
    }

    /// Number of hooks waiting to run
    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the hooks waiting to run, in registration order
    pub fn hook_names(&self) -> Vec<String> {
        self.hooks.lock().iter().map(|h| h.name.clone()).collect()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Run every registered hook concurrently, waiting at most `timeout`
    ///
    /// Never fails. Hook errors, panics and the deadline are logged and
    /// reported. Only the first call runs anything.
    #[instrument(skip(self))]
    pub async fn shutdown_all(&self, timeout: Duration) -> ShutdownReport {
        let hooks = {
            let mut hooks = self.hooks.lock();
            if self.shutting_down.swap(true, Ordering::AcqRel) {
                warn!("Shutdown already ran, nothing to do");
                return ShutdownReport::default();
            }
            std::mem::take(&mut *hooks)
        };

        let mut report = ShutdownReport {
            launched: hooks.len(),
            ..Default::default()
        };
        info!(hooks = report.launched, ?timeout, "Running shutdown hooks");

        // Spawned, so hooks left behind by the deadline keep running
        let mut pending: FuturesUnordered<_> = hooks
            .into_iter()
            .map(|h| {
                let handle = tokio::spawn((h.hook)());
                let name = h.name;
                async move { (name, handle.await) }
            })
            .collect();

        let drained = tokio::time::timeout(timeout, async {
            while let Some((name, outcome)) = pending.next().await {
                match outcome {
                    Ok(Ok(())) => report.completed += 1,
                    Ok(Err(e)) => {
                        warn!(hook = %name, error = %e, "Shutdown hook failed");
                        report.failed.push(name);
                    }
                    Err(e) => {
                        warn!(hook = %name, error = %e, "Shutdown hook panicked");
                        report.failed.push(name);
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            report.timed_out = true;
            report.outstanding = pending.len();
            error!(
                outstanding = report.outstanding,
                ?timeout,
                "Shutdown hooks took too long, refusing to wait any longer"
            );
        } else {
            info!(
                completed = report.completed,
                failed = report.failed.len(),
                "All shutdown hooks finished"
            );
        }

        report
    }
}

impl std::fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownRegistry")
            .field("hooks", &self.hook_names())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_all_hooks_run_before_return() {
        let registry = ShutdownRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let counter = Arc::clone(&counter);
            registry
                .register(format!("hook-{i}"), move || async move {
                    tokio::time::sleep(Duration::from_millis(10 * (3 - i))).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        let report = registry.shutdown_all(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(report.launched, 3);
        assert_eq!(report.completed, 3);
        assert!(report.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_hook_is_abandoned_at_deadline() {
        let registry = ShutdownRegistry::new();
        let finished = Arc::new(AtomicUsize::new(0));

        registry
            .register("stuck", || async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .unwrap();
        let counter = Arc::clone(&finished);
        registry
            .register("quick", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let started = tokio::time::Instant::now();
        let report = registry.shutdown_all(Duration::from_secs(1)).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
        assert!(report.timed_out);
        assert_eq!(report.outstanding, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hooks_run_concurrently() {
        let registry = ShutdownRegistry::new();
        let barrier = Arc::new(tokio::sync::Barrier::new(3));

        // Each hook only finishes once all three are running at once
        for i in 0..3 {
            let barrier = Arc::clone(&barrier);
            registry
                .register(format!("hook-{i}"), move || async move {
                    barrier.wait().await;
                    Ok(())
                })
                .unwrap();
        }

        let report = registry.shutdown_all(Duration::from_secs(5)).await;
        assert!(!report.timed_out);
        assert_eq!(report.completed, 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_failures_are_reported_not_raised() {
        let registry = ShutdownRegistry::new();
        registry
            .register("errors", || async { Err(anyhow::anyhow!("close failed")) })
            .unwrap();
        registry
            .register("panics", || async { panic!("teardown exploded") })
            .unwrap();
        registry.register("fine", || async { Ok(()) }).unwrap();

        let report = registry.shutdown_all(Duration::from_secs(5)).await;
        assert_eq!(report.completed, 1);
        let mut failed = report.failed.clone();
        failed.sort();
        assert_eq!(failed, vec!["errors".to_string(), "panics".to_string()]);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_hooks_run_exactly_once() {
        let registry = ShutdownRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry
            .register("once", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        registry.shutdown_all(Duration::from_secs(1)).await;
        let second = registry.shutdown_all(Duration::from_secs(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(second, ShutdownReport::default());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_register_after_shutdown_is_rejected() {
        let registry = ShutdownRegistry::new();
        registry.shutdown_all(Duration::from_secs(1)).await;

        let err = registry.register("late", || async { Ok(()) }).unwrap_err();
        assert!(matches!(err, PoolError::ShutDown { .. }));
    }

    #[tokio::test]
    async fn test_deregister_removes_hook() {
        let registry = ShutdownRegistry::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let id = registry
            .register("removed", move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        registry.register("kept", || async { Ok(()) }).unwrap();

        assert!(registry.deregister(id));
        assert!(!registry.deregister(id));
        assert_eq!(registry.hook_names(), vec!["kept".to_string()]);

        let report = registry.shutdown_all(Duration::from_secs(1)).await;
        assert_eq!(report.launched, 1);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_empty_registry_shuts_down_cleanly() {
        let registry = ShutdownRegistry::new();
        let report = registry.shutdown_all(Duration::from_millis(10)).await;
        assert_eq!(report.launched, 0);
        assert!(report.is_clean());
    }
}
