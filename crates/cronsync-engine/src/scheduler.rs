//! Bounded-concurrency job pool with fail-fast admission
//!
//! Tasks are admitted in list order while fewer than `limit` jobs are in
//! flight. Completions are awaited through a [`JoinSet`], so a slot frees as
//! soon as its job is reaped. After the first failure no further task is
//! admitted, but jobs already running are allowed to finish and are reaped
//! before the pass returns.

use crate::monitor::{RunReport, RunStatistics};
use crate::task::{JobRecord, JobState};
use cronsync_config::{Config, ConfigResult};
use cronsync_types::{ConcurrencyLimit, CopyError, CopyOutcome, CopyTask, Copier, Error, JobId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Configuration for the job scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerConfig {
    /// Maximum number of jobs in flight
    pub limit: ConcurrencyLimit,
}

impl SchedulerConfig {
    /// Create scheduler config from main config
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        Ok(Self {
            limit: config.concurrency_limit()?,
        })
    }

    /// Config with an explicit limit
    pub fn with_limit(limit: ConcurrencyLimit) -> Self {
        Self { limit }
    }
}

/// The failure that ended a scheduler pass
///
/// "First" means first reaped, which under parallel execution may differ
/// from first admitted.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct FirstFailure {
    /// Failed job, when the failure could be attributed to one
    pub job: Option<JobId>,
    /// Task of the failed job
    pub task: Option<CopyTask>,
    /// What went wrong
    #[source]
    pub error: Error,
    /// Counters at the end of the pass
    pub report: RunReport,
}

impl FirstFailure {
    fn from_record(record: &JobRecord, error: &CopyError, report: RunReport) -> Self {
        Self {
            job: Some(record.id),
            task: Some(record.task.clone()),
            error: Error::Copy(error.clone()),
            report,
        }
    }
}

/// Executes a task list with at most `limit` jobs in flight
#[derive(Debug, Clone, Default)]
pub struct JobScheduler {
    config: SchedulerConfig,
}

impl JobScheduler {
    /// Create a new scheduler
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Concurrency limit
    pub fn limit(&self) -> ConcurrencyLimit {
        self.config.limit
    }

    /// Run every task, stopping admissions at the first failure
    ///
    /// An empty list succeeds immediately. A limit of one runs tasks
    /// strictly in order without spawning workers.
    pub async fn execute(
        &self,
        tasks: Vec<CopyTask>,
        copier: Arc<dyn Copier>,
    ) -> Result<RunReport, FirstFailure> {
        if tasks.is_empty() {
            warn!("Task list is empty, nothing to copy");
            return Ok(RunStatistics::new(0).report());
        }

        info!(
            "Scheduling {} tasks with concurrency limit {} using {}",
            tasks.len(),
            self.config.limit,
            copier.name()
        );

        if self.config.limit.is_sequential() {
            self.execute_sequential(tasks, copier).await
        } else {
            self.execute_parallel(tasks, copier).await
        }
    }

    async fn execute_sequential(
        &self,
        tasks: Vec<CopyTask>,
        copier: Arc<dyn Copier>,
    ) -> Result<RunReport, FirstFailure> {
        let mut stats = RunStatistics::new(tasks.len());

        for (sequence, task) in (1u64..).zip(tasks) {
            let mut record = JobRecord::new(JobId::new(sequence), task);
            info!("Starting job {}: {}", record.id, record.task);
            stats.record_admitted();

            let result = copier.copy(&record.task).await;
            record.finish(result);
            stats.record_reaped(!record.state.is_failure());
            log_reaped(&record);

            if let Some(error) = record.error() {
                let report = stats.report();
                error!("Sequential run stopped at job {}: {}", record.id, report);
                return Err(FirstFailure::from_record(&record, error, report));
            }
        }

        let report = stats.report();
        info!("All jobs succeeded: {}", report);
        Ok(report)
    }

    async fn execute_parallel(
        &self,
        tasks: Vec<CopyTask>,
        copier: Arc<dyn Copier>,
    ) -> Result<RunReport, FirstFailure> {
        let limit = self.config.limit.get();
        let mut stats = RunStatistics::new(tasks.len());
        let mut pending = tasks.into_iter();
        let mut in_flight: HashMap<JobId, JobRecord> = HashMap::with_capacity(limit);
        let mut workers: JoinSet<(JobId, Result<CopyOutcome, CopyError>)> = JoinSet::new();
        let mut failure: Option<(Option<JobRecord>, Error)> = None;
        let mut sequence = 0u64;

        loop {
            while failure.is_none() && in_flight.len() < limit {
                let Some(task) = pending.next() else {
                    break;
                };
                sequence += 1;
                let id = JobId::new(sequence);
                info!(
                    "Admitting job {} ({}/{} slots): {}",
                    id,
                    in_flight.len() + 1,
                    limit,
                    task
                );

                // The copy runs in its own task so dropping the pool leaves it running
                let job_copier = Arc::clone(&copier);
                let job_task = task.clone();
                let worker = tokio::spawn(async move { job_copier.copy(&job_task).await });
                workers.spawn(async move {
                    let result = worker.await.unwrap_or_else(|e| {
                        Err(CopyError::Aborted {
                            message: e.to_string(),
                        })
                    });
                    (id, result)
                });

                in_flight.insert(id, JobRecord::new(id, task));
                stats.record_admitted();
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };

            match joined {
                Ok((id, result)) => {
                    let Some(mut record) = in_flight.remove(&id) else {
                        warn!("Reaped unknown job {}", id);
                        continue;
                    };
                    record.finish(result);
                    stats.record_reaped(!record.state.is_failure());
                    log_reaped(&record);

                    if failure.is_none() {
                        if let JobState::Failed(error) = &record.state {
                            let error = Error::Copy(error.clone());
                            if stats.in_flight() > 0 {
                                warn!(
                                    "Admissions stopped after job {} failed, waiting for {} in-flight jobs",
                                    id,
                                    stats.in_flight()
                                );
                            }
                            failure = Some((Some(record), error));
                        }
                    }
                }
                Err(e) => {
                    error!("Job supervisor failed: {}", e);
                    if failure.is_none() {
                        failure = Some((None, Error::join(e.to_string())));
                    }
                }
            }
        }

        // Records left here lost their supervisor and never reported
        for (id, record) in in_flight.drain() {
            warn!("Job {} ended without a result: {}", id, record.task);
            stats.record_reaped(false);
        }

        let report = stats.report();
        match failure {
            None => {
                info!("All jobs succeeded: {}", report);
                Ok(report)
            }
            Some((record, error)) => {
                error!("Run failed: {}", report);
                Err(FirstFailure {
                    job: record.as_ref().map(|r| r.id),
                    task: record.map(|r| r.task),
                    error,
                    report,
                })
            }
        }
    }
}

fn log_reaped(record: &JobRecord) {
    match &record.state {
        JobState::Succeeded => info!(
            "Job {} succeeded in {:.2?}: {}",
            record.id,
            record.elapsed(),
            record.task
        ),
        JobState::Failed(error) if error.is_validation() => error!(
            "Job {} rejected before copying: {}: {}",
            record.id, record.task, error
        ),
        JobState::Failed(error) => match record.state.exit_code() {
            Some(code) => error!(
                "Job {} failed with exit code {}: {}: {}",
                record.id, code, record.task, error
            ),
            None => error!("Job {} failed: {}: {}", record.id, record.task, error),
        },
        JobState::Running => warn!("Job {} reaped while still running", record.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Copier whose behaviour is keyed by source path
    #[derive(Default)]
    struct FakeCopier {
        failing: HashSet<PathBuf>,
        delays: HashMap<PathBuf, Duration>,
        current: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<PathBuf>>,
        finished: Mutex<Vec<PathBuf>>,
    }

    impl FakeCopier {
        fn failing(mut self, source: &str) -> Self {
            self.failing.insert(PathBuf::from(source));
            self
        }

        fn delay(mut self, source: &str, millis: u64) -> Self {
            self.delays
                .insert(PathBuf::from(source), Duration::from_millis(millis));
            self
        }

        fn started(&self) -> Vec<PathBuf> {
            self.started.lock().unwrap().clone()
        }

        fn finished(&self) -> Vec<PathBuf> {
            self.finished.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Copier for FakeCopier {
        async fn copy(&self, task: &CopyTask) -> Result<CopyOutcome, CopyError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.started.lock().unwrap().push(task.source.clone());

            match self.delays.get(&task.source) {
                Some(delay) => tokio::time::sleep(*delay).await,
                None => tokio::task::yield_now().await,
            }

            self.current.fetch_sub(1, Ordering::SeqCst);
            self.finished.lock().unwrap().push(task.source.clone());

            if self.failing.contains(&task.source) {
                Err(CopyError::NonZeroExit { code: 1 })
            } else {
                Ok(CopyOutcome::default())
            }
        }
    }

    fn tasks(sources: &[&str]) -> Vec<CopyTask> {
        sources
            .iter()
            .map(|source| CopyTask::new(*source, "/backup"))
            .collect()
    }

    fn scheduler(limit: usize) -> JobScheduler {
        JobScheduler::new(SchedulerConfig::with_limit(
            ConcurrencyLimit::new(limit).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_empty_list_succeeds() {
        let copier = Arc::new(FakeCopier::default());
        let report = scheduler(2).execute(Vec::new(), copier.clone()).await.unwrap();

        assert_eq!(report.total, 0);
        assert!(copier.started().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_all_succeed() {
        let copier = Arc::new(
            FakeCopier::default()
                .delay("/a", 10)
                .delay("/b", 10)
                .delay("/c", 10),
        );

        let report = scheduler(2)
            .execute(tasks(&["/a", "/b", "/c"]), copier.clone())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.peak_in_flight, 2);
        assert_eq!(copier.peak.load(Ordering::SeqCst), 2);
        assert_eq!(copier.started().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_failure_stops_admissions() {
        let copier = Arc::new(
            FakeCopier::default()
                .failing("/a")
                .delay("/a", 10)
                .delay("/b", 100),
        );

        let failure = scheduler(2)
            .execute(tasks(&["/a", "/b", "/c"]), copier.clone())
            .await
            .unwrap_err();

        assert_eq!(failure.job, Some(JobId::new(1)));
        assert_eq!(failure.task.unwrap().source, PathBuf::from("/a"));
        // /b was in flight and was waited for, /c never started
        assert_eq!(
            copier.started(),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
        assert_eq!(copier.finished().len(), 2);
        assert_eq!(failure.report.admitted, 2);
        assert_eq!(failure.report.succeeded, 1);
        assert_eq!(failure.report.skipped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_admits_in_list_order() {
        let copier = Arc::new(
            FakeCopier::default()
                .delay("/a", 30)
                .delay("/b", 10)
                .delay("/c", 10)
                .delay("/d", 20),
        );

        scheduler(2)
            .execute(tasks(&["/a", "/b", "/c", "/d"]), copier.clone())
            .await
            .unwrap();

        // Admission follows the list even though /a is the slowest job
        assert_eq!(
            copier.started(),
            vec![
                PathBuf::from("/a"),
                PathBuf::from("/b"),
                PathBuf::from("/c"),
                PathBuf::from("/d"),
            ]
        );
        assert_eq!(
            copier.finished(),
            vec![
                PathBuf::from("/b"),
                PathBuf::from("/c"),
                PathBuf::from("/a"),
                PathBuf::from("/d"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_is_first_reaped() {
        let copier = Arc::new(
            FakeCopier::default()
                .failing("/slow")
                .failing("/fast")
                .delay("/slow", 50)
                .delay("/fast", 10),
        );

        let failure = scheduler(2)
            .execute(tasks(&["/slow", "/fast"]), copier)
            .await
            .unwrap_err();

        assert_eq!(failure.job, Some(JobId::new(2)));
        assert_eq!(failure.report.failed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_is_reused_after_reap() {
        let copier = Arc::new(
            FakeCopier::default()
                .delay("/long", 100)
                .delay("/short", 10)
                .delay("/next", 10),
        );

        scheduler(2)
            .execute(tasks(&["/long", "/short", "/next"]), copier.clone())
            .await
            .unwrap();

        // /next takes the slot of /short while /long is still running
        assert_eq!(
            copier.finished(),
            vec![
                PathBuf::from("/short"),
                PathBuf::from("/next"),
                PathBuf::from("/long"),
            ]
        );
    }

    #[tokio::test]
    async fn test_sequential_stops_at_failure() {
        let copier = Arc::new(FakeCopier::default().failing("/b"));

        let failure = scheduler(1)
            .execute(tasks(&["/a", "/b", "/c"]), copier.clone())
            .await
            .unwrap_err();

        assert_eq!(failure.job, Some(JobId::new(2)));
        assert_eq!(copier.started(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(copier.peak.load(Ordering::SeqCst), 1);
        assert!(matches!(
            failure.error,
            Error::Copy(CopyError::NonZeroExit { code: 1 })
        ));
    }

    #[tokio::test]
    async fn test_sequential_runs_in_order() {
        let copier = Arc::new(FakeCopier::default());

        let report = scheduler(1)
            .execute(tasks(&["/c", "/a", "/b"]), copier.clone())
            .await
            .unwrap();

        assert_eq!(report.peak_in_flight, 1);
        assert_eq!(
            copier.finished(),
            vec![PathBuf::from("/c"), PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }

    #[tokio::test]
    async fn test_panicking_copier_is_a_failure() {
        struct PanickingCopier;

        #[async_trait]
        impl Copier for PanickingCopier {
            async fn copy(&self, _task: &CopyTask) -> Result<CopyOutcome, CopyError> {
                panic!("copier bug");
            }
        }

        let failure = scheduler(2)
            .execute(tasks(&["/a"]), Arc::new(PanickingCopier))
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            Error::Copy(CopyError::Aborted { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_pool_respects_limit(
            limit in 1usize..6,
            count in 0usize..12,
            fail_at in proptest::option::of(0usize..12),
        ) {
            let sources: Vec<String> = (0..count).map(|i| format!("/src/{}", i)).collect();
            let mut copier = FakeCopier::default();
            if let Some(index) = fail_at.filter(|index| *index < count) {
                copier = copier.failing(&sources[index]);
            }
            let copier = Arc::new(copier);
            let list: Vec<CopyTask> = sources
                .iter()
                .map(|source| CopyTask::new(source.as_str(), "/backup"))
                .collect();

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let result = runtime.block_on(scheduler(limit).execute(list, copier.clone()));

            prop_assert!(copier.peak.load(Ordering::SeqCst) <= limit);
            // Every admitted job is reaped before the pass returns
            prop_assert_eq!(copier.started().len(), copier.finished().len());

            match fail_at.filter(|index| *index < count) {
                None => prop_assert!(result.is_ok()),
                Some(index) => {
                    let failure = result.unwrap_err();
                    prop_assert_eq!(failure.job, Some(JobId::new(index as u64 + 1)));
                    // Nothing beyond the failed job plus the slots that were open can start
                    prop_assert!(copier.started().len() <= index + limit);
                }
            }
        }
    }
}
