//! Sync engine wiring configuration to the run controller

use crate::{
    control::{ControlPlane, FsMarkerStore},
    controller::RunController,
    executor::{CopierConfig, RsyncCopier},
    scheduler::{JobScheduler, SchedulerConfig},
};
use cronsync_config::{Config, ConfigLoader};
use cronsync_types::{CopyTask, Copier, ExitStatus, MarkerStore, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Main engine that runs the configured task list
#[derive(Debug, Clone)]
pub struct SyncEngine {
    config: Arc<Config>,
    tasks: Vec<CopyTask>,
    controller: RunController,
}

impl SyncEngine {
    /// Create a new engine from the default configuration locations
    pub fn new() -> Result<Self> {
        let config = ConfigLoader::load_default()?;
        Self::with_config(config)
    }

    /// Create a new engine with rsync and marker files from `config`
    pub fn with_config(config: Config) -> Result<Self> {
        EngineBuilder::new().with_config(config).build()
    }

    /// Run the task list once
    pub async fn run(&self) -> ExitStatus {
        self.controller.run(self.tasks.clone()).await
    }

    /// Run the task list, abandoning it when `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> ExitStatus
    where
        F: Future<Output = ()>,
    {
        self.controller.run_until(self.tasks.clone(), shutdown).await
    }

    /// Control plane for reading and changing flags
    pub fn control(&self) -> &ControlPlane {
        self.controller.control()
    }

    /// Validated task list
    pub fn tasks(&self) -> &[CopyTask] {
        &self.tasks
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &Config {
        &self.config
    }
}

/// Builder for a sync engine with replaceable components
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<Config>,
    scheduler_config: Option<SchedulerConfig>,
    copier: Option<Arc<dyn Copier>>,
    marker_store: Option<Arc<dyn MarkerStore>>,
}

impl EngineBuilder {
    /// Create a new engine builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the scheduler configuration
    pub fn with_scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler_config = Some(config);
        self
    }

    /// Use a copier other than rsync
    pub fn with_copier(mut self, copier: Arc<dyn Copier>) -> Self {
        self.copier = Some(copier);
        self
    }

    /// Use a marker store other than the configured flags directory
    pub fn with_marker_store(mut self, store: Arc<dyn MarkerStore>) -> Self {
        self.marker_store = Some(store);
        self
    }

    /// Build the sync engine
    pub fn build(self) -> Result<SyncEngine> {
        let config = match self.config {
            Some(config) => config,
            None => ConfigLoader::load_default()?,
        };

        let tasks = config.task_list()?;
        let scheduler_config = match self.scheduler_config {
            Some(scheduler_config) => scheduler_config,
            None => SchedulerConfig::from_config(&config)?,
        };
        let copier = self.copier.unwrap_or_else(|| {
            Arc::new(RsyncCopier::new(CopierConfig::from_config(&config.rsync)))
        });
        let store = self
            .marker_store
            .unwrap_or_else(|| Arc::new(FsMarkerStore::from_config(&config.flags)));

        info!(
            "Sync engine initialized: {} tasks, concurrency limit {}, copier {}",
            tasks.len(),
            scheduler_config.limit,
            copier.name()
        );

        let controller = RunController::new(
            ControlPlane::new(store),
            JobScheduler::new(scheduler_config),
            copier,
        );

        Ok(SyncEngine {
            config: Arc::new(config),
            tasks,
            controller,
        })
    }
}
