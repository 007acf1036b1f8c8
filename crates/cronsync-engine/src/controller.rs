//! Run lifecycle around the control-plane flags
//!
//! One invocation goes through these steps:
//!
//! 1. `stopped` present: skip the run, touching nothing.
//! 2. `running` present: refuse to start, touching nothing.
//! 3. Take `running`, clear `failed`.
//! 4. Execute the task list through the scheduler.
//! 5. On failure set `failed`.
//! 6. Clear `running` on every path out of step 3.

use crate::control::ControlPlane;
use crate::scheduler::JobScheduler;
use cronsync_types::{ControlFlag, CopyTask, Copier, ExitStatus, RunId};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Drives one orchestrator invocation
#[derive(Clone)]
pub struct RunController {
    control: ControlPlane,
    scheduler: JobScheduler,
    copier: Arc<dyn Copier>,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("control", &self.control)
            .field("scheduler", &self.scheduler)
            .field("copier", &self.copier.name())
            .finish()
    }
}

impl RunController {
    /// Create a new controller
    pub fn new(control: ControlPlane, scheduler: JobScheduler, copier: Arc<dyn Copier>) -> Self {
        Self {
            control,
            scheduler,
            copier,
        }
    }

    /// Control plane used by this controller
    pub fn control(&self) -> &ControlPlane {
        &self.control
    }

    /// Run the task list once
    pub async fn run(&self, tasks: Vec<CopyTask>) -> ExitStatus {
        let run_id = RunId::new();
        self.run_inner(tasks)
            .instrument(info_span!("run", id = %run_id))
            .await
    }

    /// Run the task list, giving up early when `shutdown` resolves
    ///
    /// On shutdown the run future is dropped: `running` is cleared, `failed`
    /// is left alone and in-flight copier processes keep running.
    pub async fn run_until<F>(&self, tasks: Vec<CopyTask>, shutdown: F) -> ExitStatus
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            status = self.run(tasks) => status,
            () = shutdown => {
                warn!("Shutdown requested, abandoning run");
                ExitStatus::Interrupted
            }
        }
    }

    async fn run_inner(&self, tasks: Vec<CopyTask>) -> ExitStatus {
        match self.control.is_set(ControlFlag::Stopped) {
            Ok(true) => {
                info!(
                    "Stopped flag present at {}, skipping run",
                    self.control.locate(ControlFlag::Stopped)
                );
                return ExitStatus::SkippedByStop;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Cannot read stopped flag: {}", e);
                return ExitStatus::Failed;
            }
        }

        let guard = match self.control.acquire() {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                error!(
                    "Another run is in progress ({} is present), not starting",
                    self.control.locate(ControlFlag::Running)
                );
                return ExitStatus::AlreadyRunning;
            }
            Err(e) => {
                error!("Cannot take running flag: {}", e);
                return ExitStatus::Failed;
            }
        };

        let mut status = match self.control.clear(ControlFlag::Failed) {
            Ok(()) => self.execute(tasks).await,
            Err(e) => {
                error!("Cannot clear failed flag: {}", e);
                self.mark_failed();
                ExitStatus::Failed
            }
        };

        if let Err(e) = guard.release() {
            error!("Cannot clear running flag: {}", e);
            status = ExitStatus::Failed;
        }

        info!("Run finished with {:?} (exit code {})", status, status.code());
        status
    }

    async fn execute(&self, tasks: Vec<CopyTask>) -> ExitStatus {
        info!("Run started with {} tasks", tasks.len());

        match self.scheduler.execute(tasks, Arc::clone(&self.copier)).await {
            Ok(report) => {
                info!("Run succeeded: {}", report);
                ExitStatus::Success
            }
            Err(failure) => {
                match (&failure.job, &failure.task) {
                    (Some(job), Some(task)) => {
                        error!("Run failed at job {} ({}): {}", job, task, failure.error);
                    }
                    _ => error!("Run failed: {}", failure.error),
                }
                self.mark_failed();
                ExitStatus::Failed
            }
        }
    }

    fn mark_failed(&self) {
        if let Err(e) = self.control.set(ControlFlag::Failed) {
            error!("Cannot set failed flag: {}", e);
        } else {
            warn!(
                "Failed flag set at {}",
                self.control.locate(ControlFlag::Failed)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{MarkerEvent, MemoryMarkerStore};
    use crate::scheduler::SchedulerConfig;
    use async_trait::async_trait;
    use cronsync_types::{ConcurrencyLimit, CopyError, CopyOutcome, Error, MarkerStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingCopier {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingCopier {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
                delay: Duration::ZERO,
            }
        }

        fn slow() -> Self {
            Self {
                delay: Duration::from_secs(60),
                ..Self::new(false)
            }
        }
    }

    #[async_trait]
    impl Copier for CountingCopier {
        async fn copy(&self, _task: &CopyTask) -> Result<CopyOutcome, CopyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(CopyError::NonZeroExit { code: 23 })
            } else {
                Ok(CopyOutcome::default())
            }
        }
    }

    /// Store whose writes to one flag always fail
    struct BrokenStore {
        inner: MemoryMarkerStore,
        broken: ControlFlag,
    }

    impl MarkerStore for BrokenStore {
        fn exists(&self, flag: ControlFlag) -> cronsync_types::Result<bool> {
            self.inner.exists(flag)
        }

        fn create(&self, flag: ControlFlag) -> cronsync_types::Result<()> {
            if flag == self.broken {
                return Err(Error::marker(flag.default_name(), "read-only file system"));
            }
            self.inner.create(flag)
        }

        fn delete(&self, flag: ControlFlag) -> cronsync_types::Result<()> {
            if flag == self.broken {
                return Err(Error::marker(flag.default_name(), "read-only file system"));
            }
            self.inner.delete(flag)
        }
    }

    fn controller(
        store: Arc<dyn MarkerStore>,
        copier: Arc<dyn Copier>,
        limit: usize,
    ) -> RunController {
        RunController::new(
            ControlPlane::new(store),
            JobScheduler::new(SchedulerConfig::with_limit(
                ConcurrencyLimit::new(limit).unwrap(),
            )),
            copier,
        )
    }

    fn tasks(count: usize) -> Vec<CopyTask> {
        (0..count)
            .map(|i| CopyTask::new(format!("/srv/{}", i), "/backup"))
            .collect()
    }

    #[tokio::test]
    async fn test_success_clears_flags() {
        let store = Arc::new(MemoryMarkerStore::with_flags([ControlFlag::Failed]));
        let copier = Arc::new(CountingCopier::new(false));

        let status = controller(store.clone(), copier.clone(), 2)
            .run(tasks(3))
            .await;

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(copier.calls.load(Ordering::SeqCst), 3);
        assert!(!store.is_present(ControlFlag::Running));
        assert!(!store.is_present(ControlFlag::Failed));
    }

    #[tokio::test]
    async fn test_failure_sets_failed() {
        let store = Arc::new(MemoryMarkerStore::new());
        let copier = Arc::new(CountingCopier::new(true));

        let status = controller(store.clone(), copier, 1).run(tasks(2)).await;

        assert_eq!(status, ExitStatus::Failed);
        assert_eq!(status.code(), 1);
        assert!(store.is_present(ControlFlag::Failed));
        assert!(!store.is_present(ControlFlag::Running));
    }

    #[tokio::test]
    async fn test_stopped_skips_without_side_effects() {
        let store = Arc::new(MemoryMarkerStore::with_flags([
            ControlFlag::Stopped,
            ControlFlag::Failed,
        ]));
        let copier = Arc::new(CountingCopier::new(false));

        let status = controller(store.clone(), copier.clone(), 2)
            .run(tasks(2))
            .await;

        assert_eq!(status, ExitStatus::SkippedByStop);
        assert_eq!(status.code(), 0);
        assert_eq!(copier.calls.load(Ordering::SeqCst), 0);
        assert!(store.history().is_empty());
        assert!(store.is_present(ControlFlag::Failed));
    }

    #[tokio::test]
    async fn test_running_refuses_without_side_effects() {
        let store = Arc::new(MemoryMarkerStore::with_flags([ControlFlag::Running]));
        let copier = Arc::new(CountingCopier::new(false));

        let status = controller(store.clone(), copier.clone(), 2)
            .run(tasks(2))
            .await;

        assert_eq!(status, ExitStatus::AlreadyRunning);
        assert_eq!(status.code(), 1);
        assert_eq!(copier.calls.load(Ordering::SeqCst), 0);
        assert!(store.history().is_empty());
        assert!(store.is_present(ControlFlag::Running));
    }

    #[tokio::test]
    async fn test_empty_list_succeeds() {
        let store = Arc::new(MemoryMarkerStore::new());
        let copier = Arc::new(CountingCopier::new(false));

        let status = controller(store.clone(), copier, 2).run(Vec::new()).await;

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(
            store.history(),
            vec![
                MarkerEvent::Created(ControlFlag::Running),
                MarkerEvent::Deleted(ControlFlag::Failed),
                MarkerEvent::Deleted(ControlFlag::Running),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_running_only() {
        let store = Arc::new(MemoryMarkerStore::new());
        let copier = Arc::new(CountingCopier::slow());

        let status = controller(store.clone(), copier.clone(), 2)
            .run_until(tasks(2), tokio::time::sleep(Duration::from_secs(1)))
            .await;

        assert_eq!(status, ExitStatus::Interrupted);
        assert_eq!(copier.calls.load(Ordering::SeqCst), 2);
        assert!(!store.is_present(ControlFlag::Running));
        assert!(!store.is_present(ControlFlag::Failed));
    }

    #[tokio::test]
    async fn test_failed_flag_write_error_fails_run() {
        let store = Arc::new(BrokenStore {
            inner: MemoryMarkerStore::new(),
            broken: ControlFlag::Failed,
        });
        let copier = Arc::new(CountingCopier::new(false));

        let status = controller(store.clone(), copier.clone(), 2)
            .run(tasks(1))
            .await;

        assert_eq!(status, ExitStatus::Failed);
        assert_eq!(copier.calls.load(Ordering::SeqCst), 0);
        assert!(!store.inner.is_present(ControlFlag::Running));
    }

    #[tokio::test]
    async fn test_running_flag_error_refuses_run() {
        let store = Arc::new(BrokenStore {
            inner: MemoryMarkerStore::new(),
            broken: ControlFlag::Running,
        });
        let copier = Arc::new(CountingCopier::new(false));

        let status = controller(store, copier.clone(), 2).run(tasks(1)).await;

        assert_eq!(status, ExitStatus::Failed);
        assert_eq!(copier.calls.load(Ordering::SeqCst), 0);
    }
}
