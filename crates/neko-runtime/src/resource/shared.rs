//! Lazily built, process-wide shared resource

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::PoolError;
use crate::shutdown::ShutdownRegistry;

enum Slot<R> {
    Empty,
    Ready(Arc<R>),
    Closed,
}

/// A resource built on first use and shared until shutdown
///
/// Construction is single-flight: concurrent first callers queue on one
/// build lock and receive the same `Arc`. A failed construction caches
/// nothing, so the next caller tries again. The teardown hook is registered
/// right after the one successful construction and takes the resource out
/// of the slot, so once teardown has started the resource is never handed
/// out or rebuilt again.
pub struct SharedResource<R> {
    name: &'static str,
    slot: Arc<RwLock<Slot<R>>>,
    building: Mutex<()>,
}

impl<R> SharedResource<R>
where
    R: Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Arc::new(RwLock::new(Slot::Empty)),
            building: Mutex::new(()),
        }
    }

    /// Get the resource, building it with `init` if this is the first call
    ///
    /// `teardown` is registered with `registry` under this resource's name
    /// and receives the shared resource when shutdown runs. The registry's
    /// reference is the last one this type holds.
    pub async fn get_or_init<I, IFut, T, TFut>(
        &self,
        registry: &ShutdownRegistry,
        init: I,
        teardown: T,
    ) -> Result<Arc<R>, PoolError>
    where
        I: FnOnce() -> IFut,
        IFut: Future<Output = Result<R, PoolError>>,
        T: FnOnce(Arc<R>) -> TFut + Send + 'static,
        TFut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if registry.is_shutting_down() {
            return Err(self.shut_down());
        }
        if let Some(existing) = self.current()? {
            debug!(resource = self.name, "Acquiring existing pool");
            return Ok(existing);
        }

        let _building = self.building.lock().await;
        // Built by whoever held the lock before us
        if let Some(existing) = self.current()? {
            debug!(resource = self.name, "Acquiring existing pool");
            return Ok(existing);
        }

        info!(resource = self.name, "Initialising pool");
        let resource = Arc::new(init().await?);

        {
            let mut slot = self.slot.write();
            let hooked = Arc::clone(&self.slot);
            registry.register(self.name, move || async move {
                let taken = std::mem::replace(&mut *hooked.write(), Slot::Closed);
                match taken {
                    Slot::Ready(resource) => teardown(resource).await,
                    Slot::Empty | Slot::Closed => Ok(()),
                }
            })?;
            *slot = Slot::Ready(Arc::clone(&resource));
        }

        Ok(resource)
    }

    fn current(&self) -> Result<Option<Arc<R>>, PoolError> {
        match &*self.slot.read() {
            Slot::Empty => Ok(None),
            Slot::Ready(resource) => Ok(Some(Arc::clone(resource))),
            Slot::Closed => Err(self.shut_down()),
        }
    }

    fn shut_down(&self) -> PoolError {
        PoolError::ShutDown {
            resource: self.name,
        }
    }

    /// The resource, if it has been built and not torn down
    pub fn get(&self) -> Option<Arc<R>> {
        self.current().ok().flatten()
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.slot.read(), Slot::Ready(_))
    }

    /// Whether teardown has started
    pub fn is_closed(&self) -> bool {
        matches!(*self.slot.read(), Slot::Closed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<R> std::fmt::Debug for SharedResource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.slot.read() {
            Slot::Empty => "empty",
            Slot::Ready(_) => "ready",
            Slot::Closed => "closed",
        };
        f.debug_struct("SharedResource")
            .field("name", &self.name)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Session {
        serial: usize,
    }

    fn counting_init(
        built: &Arc<AtomicUsize>,
    ) -> impl Future<Output = Result<Session, PoolError>> {
        let built = Arc::clone(built);
        async move {
            // Widen the race window
            tokio::time::sleep(Duration::from_millis(20)).await;
            let serial = built.fetch_add(1, Ordering::SeqCst);
            Ok(Session { serial })
        }
    }

    #[tokio::test]
    async fn test_sequential_acquire_returns_same_resource() {
        let registry = ShutdownRegistry::new();
        let shared = SharedResource::new("session");
        let built = Arc::new(AtomicUsize::new(0));

        let a = shared
            .get_or_init(&registry, || counting_init(&built), |_| async { Ok(()) })
            .await
            .unwrap();
        let b = shared
            .get_or_init(&registry, || counting_init(&built), |_| async { Ok(()) })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(registry.hook_names(), vec!["session".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_acquire_builds_once() {
        let registry = Arc::new(ShutdownRegistry::new());
        let shared = Arc::new(SharedResource::new("session"));
        let built = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let shared = Arc::clone(&shared);
            let built = Arc::clone(&built);
            handles.push(tokio::spawn(async move {
                shared
                    .get_or_init(&registry, || counting_init(&built), |_| async { Ok(()) })
                    .await
                    .unwrap()
            }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(sessions[0].serial, 0);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_construction_is_retried() {
        let registry = ShutdownRegistry::new();
        let shared: SharedResource<Session> = SharedResource::new("flaky");

        let err = shared
            .get_or_init(
                &registry,
                || async { Err(PoolError::construction("flaky", anyhow::anyhow!("refused"))) },
                |_| async { Ok(()) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Construction { .. }));
        assert!(!shared.is_initialized());
        assert!(registry.is_empty());

        let session = shared
            .get_or_init(&registry, || async { Ok(Session { serial: 7 }) }, |_| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(session.serial, 7);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_teardown_runs_once_and_blocks_rebuild() {
        let registry = ShutdownRegistry::new();
        let shared = SharedResource::new("session");
        let torn_down = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&torn_down);
        let session = shared
            .get_or_init(
                &registry,
                || async { Ok(Session { serial: 1 }) },
                move |s: Arc<Session>| async move {
                    assert_eq!(s.serial, 1);
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .await
            .unwrap();
        drop(session);

        let report = registry.shutdown_all(Duration::from_secs(1)).await;
        assert_eq!(report.completed, 1);
        assert_eq!(torn_down.load(Ordering::SeqCst), 1);
        assert!(shared.is_closed());
        assert!(shared.get().is_none());

        let err = shared
            .get_or_init(&registry, || async { Ok(Session { serial: 2 }) }, |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::ShutDown { resource: "session" }));
    }

    #[tokio::test]
    async fn test_teardown_receives_last_reference() {
        let registry = ShutdownRegistry::new();
        let shared = SharedResource::new("session");

        let session = shared
            .get_or_init(
                &registry,
                || async { Ok(Session { serial: 3 }) },
                |s: Arc<Session>| async move {
                    assert_eq!(Arc::strong_count(&s), 1);
                    Ok(())
                },
            )
            .await
            .unwrap();
        let weak = Arc::downgrade(&session);
        drop(session);
        assert!(weak.upgrade().is_some());

        let report = registry.shutdown_all(Duration::from_secs(1)).await;
        assert!(report.is_clean());
        assert!(weak.upgrade().is_none());
        assert!(!shared.is_initialized());
    }
}
