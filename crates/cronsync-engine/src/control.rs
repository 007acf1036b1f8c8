//! Control-plane flags shared across orchestrator invocations
//!
//! Three presence/absence markers coordinate runs that never talk to each
//! other directly: `running` enforces mutual exclusion, `stopped` lets an
//! operator pause scheduling, and `failed` records that the last run did
//! not complete cleanly. The orchestration logic only sees the
//! [`MarkerStore`] trait, so it runs unchanged against marker files
//! ([`FsMarkerStore`]) or an in-memory fake ([`MemoryMarkerStore`]).

use cronsync_config::FlagsConfig;
use cronsync_types::{ControlFlag, Error, MarkerStore, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Marker files in a single directory
#[derive(Debug, Clone)]
pub struct FsMarkerStore {
    config: FlagsConfig,
}

impl FsMarkerStore {
    /// Create a store using the default marker names
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            config: FlagsConfig {
                directory: directory.into(),
                ..FlagsConfig::default()
            },
        }
    }

    /// Create a store from configuration
    pub fn from_config(config: &FlagsConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Directory holding the markers
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Marker file path for a flag
    pub fn path_for(&self, flag: ControlFlag) -> PathBuf {
        self.config.path_for(flag)
    }

    fn marker_error(&self, flag: ControlFlag, error: &std::io::Error) -> Error {
        Error::marker(
            self.path_for(flag).display().to_string(),
            error.to_string(),
        )
    }

    fn ensure_directory(&self, flag: ControlFlag) -> Result<()> {
        std::fs::create_dir_all(self.directory()).map_err(|e| self.marker_error(flag, &e))
    }

    /// Exclusively create the marker and fill it with `write`
    ///
    /// A marker whose contents could not be written is removed again, so a
    /// failed claim never leaves the flag behind.
    fn claim<F>(&self, flag: ControlFlag, write: F) -> Result<bool>
    where
        F: FnOnce(&mut File) -> std::io::Result<()>,
    {
        self.ensure_directory(flag)?;
        let path = self.path_for(flag);
        // create_new makes check-and-set a single filesystem operation
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(self.marker_error(flag, &e)),
        };

        if let Err(e) = write(&mut file) {
            drop(file);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(remove) if remove.kind() == ErrorKind::NotFound => {}
                Err(remove) => error!("Failed to remove partial {} marker: {}", flag, remove),
            }
            return Err(self.marker_error(flag, &e));
        }
        Ok(true)
    }
}

impl MarkerStore for FsMarkerStore {
    fn exists(&self, flag: ControlFlag) -> Result<bool> {
        self.path_for(flag)
            .try_exists()
            .map_err(|e| self.marker_error(flag, &e))
    }

    fn create(&self, flag: ControlFlag) -> Result<()> {
        self.ensure_directory(flag)?;
        std::fs::write(self.path_for(flag), format!("{}\n", std::process::id()))
            .map_err(|e| self.marker_error(flag, &e))
    }

    fn try_create(&self, flag: ControlFlag) -> Result<bool> {
        self.claim(flag, |file| writeln!(file, "{}", std::process::id()))
    }

    fn delete(&self, flag: ControlFlag) -> Result<()> {
        match std::fs::remove_file(self.path_for(flag)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.marker_error(flag, &e)),
        }
    }

    fn locate(&self, flag: ControlFlag) -> String {
        self.path_for(flag).display().to_string()
    }
}

/// Mutation recorded by [`MemoryMarkerStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerEvent {
    /// A flag was made present
    Created(ControlFlag),
    /// A flag was made absent
    Deleted(ControlFlag),
}

#[derive(Debug, Default)]
struct MemoryState {
    present: HashSet<ControlFlag>,
    history: Vec<MarkerEvent>,
}

/// In-memory marker store that records every mutation
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    state: Mutex<MemoryState>,
}

impl MemoryMarkerStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with some flags already present
    ///
    /// Pre-set flags are not recorded in the history.
    pub fn with_flags<I: IntoIterator<Item = ControlFlag>>(flags: I) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                present: flags.into_iter().collect(),
                history: Vec::new(),
            }),
        }
    }

    /// Check whether a flag is present
    pub fn is_present(&self, flag: ControlFlag) -> bool {
        self.lock().present.contains(&flag)
    }

    /// Every mutation in order
    pub fn history(&self) -> Vec<MarkerEvent> {
        self.lock().history.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test thread panicked mid-update
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn exists(&self, flag: ControlFlag) -> Result<bool> {
        Ok(self.lock().present.contains(&flag))
    }

    fn create(&self, flag: ControlFlag) -> Result<()> {
        let mut state = self.lock();
        state.present.insert(flag);
        state.history.push(MarkerEvent::Created(flag));
        Ok(())
    }

    fn delete(&self, flag: ControlFlag) -> Result<()> {
        let mut state = self.lock();
        state.present.remove(&flag);
        state.history.push(MarkerEvent::Deleted(flag));
        Ok(())
    }
}

/// Presence of all three flags at one moment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagSnapshot {
    /// `running` present
    pub running: bool,
    /// `stopped` present
    pub stopped: bool,
    /// `failed` present
    pub failed: bool,
}

impl FlagSnapshot {
    /// Presence of one flag
    pub fn get(&self, flag: ControlFlag) -> bool {
        match flag {
            ControlFlag::Running => self.running,
            ControlFlag::Stopped => self.stopped,
            ControlFlag::Failed => self.failed,
        }
    }
}

/// Typed access to the control flags
#[derive(Clone)]
pub struct ControlPlane {
    store: Arc<dyn MarkerStore>,
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("running", &self.store.locate(ControlFlag::Running))
            .finish_non_exhaustive()
    }
}

impl ControlPlane {
    /// Create a control plane over a marker store
    pub fn new(store: Arc<dyn MarkerStore>) -> Self {
        Self { store }
    }

    /// Check whether a flag is present
    pub fn is_set(&self, flag: ControlFlag) -> Result<bool> {
        self.store.exists(flag)
    }

    /// Make a flag present
    pub fn set(&self, flag: ControlFlag) -> Result<()> {
        self.store.create(flag)?;
        debug!(marker = %self.store.locate(flag), "Flag set");
        Ok(())
    }

    /// Make a flag absent
    pub fn clear(&self, flag: ControlFlag) -> Result<()> {
        self.store.delete(flag)?;
        debug!(marker = %self.store.locate(flag), "Flag cleared");
        Ok(())
    }

    /// Location of a flag, for log lines
    pub fn locate(&self, flag: ControlFlag) -> String {
        self.store.locate(flag)
    }

    /// Read all three flags
    pub fn snapshot(&self) -> Result<FlagSnapshot> {
        Ok(FlagSnapshot {
            running: self.is_set(ControlFlag::Running)?,
            stopped: self.is_set(ControlFlag::Stopped)?,
            failed: self.is_set(ControlFlag::Failed)?,
        })
    }

    /// Take the `running` flag
    ///
    /// Returns `None` without touching any state when another instance
    /// already holds it.
    pub fn acquire(&self) -> Result<Option<RunGuard>> {
        if !self.store.try_create(ControlFlag::Running)? {
            return Ok(None);
        }
        info!(marker = %self.store.locate(ControlFlag::Running), "Run acquired");
        Ok(Some(RunGuard {
            store: Arc::clone(&self.store),
            released: false,
        }))
    }
}

/// Ownership of the `running` flag
///
/// The flag is cleared exactly once: by [`RunGuard::release`], or by `Drop`
/// when the owning future is dropped or unwinds.
#[must_use = "dropping the guard releases the run immediately"]
pub struct RunGuard {
    store: Arc<dyn MarkerStore>,
    released: bool,
}

impl RunGuard {
    /// Clear the `running` flag and report the outcome
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.store.delete(ControlFlag::Running)?;
        info!(marker = %self.store.locate(ControlFlag::Running), "Run released");
        Ok(())
    }
}

impl std::fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunGuard")
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.store.delete(ControlFlag::Running) {
            Ok(()) => info!(
                marker = %self.store.locate(ControlFlag::Running),
                "Run released during shutdown"
            ),
            Err(e) => error!("Failed to clear running flag: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_store_create_exists_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsMarkerStore::new(temp_dir.path().join("flags"));

        assert!(!store.exists(ControlFlag::Failed).unwrap());
        store.create(ControlFlag::Failed).unwrap();
        assert!(store.exists(ControlFlag::Failed).unwrap());
        assert!(temp_dir.path().join("flags/failed").exists());

        store.delete(ControlFlag::Failed).unwrap();
        store.delete(ControlFlag::Failed).unwrap();
        assert!(!store.exists(ControlFlag::Failed).unwrap());
    }

    #[test]
    fn test_fs_store_try_create_is_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsMarkerStore::new(temp_dir.path());

        assert!(store.try_create(ControlFlag::Running).unwrap());
        assert!(!store.try_create(ControlFlag::Running).unwrap());

        let contents = std::fs::read_to_string(store.path_for(ControlFlag::Running)).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_failed_marker_write_leaves_no_marker() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsMarkerStore::new(temp_dir.path());

        let result = store.claim(ControlFlag::Running, |_| {
            Err(std::io::Error::other("No space left on device"))
        });

        let error = result.unwrap_err();
        assert!(error.to_string().contains("No space left on device"));
        assert!(!store.path_for(ControlFlag::Running).exists());
        // The next run can still take the flag
        assert!(store.try_create(ControlFlag::Running).unwrap());
    }

    #[test]
    fn test_fs_store_custom_names() {
        let temp_dir = TempDir::new().unwrap();
        let config = FlagsConfig {
            directory: temp_dir.path().to_path_buf(),
            running: "backup.lock".to_string(),
            ..FlagsConfig::default()
        };
        let store = FsMarkerStore::from_config(&config);

        store.create(ControlFlag::Running).unwrap();
        assert!(temp_dir.path().join("backup.lock").exists());
        assert!(store.locate(ControlFlag::Running).ends_with("backup.lock"));
    }

    #[test]
    fn test_guard_release_clears_running() {
        let store = Arc::new(MemoryMarkerStore::new());
        let control = ControlPlane::new(store.clone());

        let guard = control.acquire().unwrap().expect("flag was free");
        assert!(store.is_present(ControlFlag::Running));

        guard.release().unwrap();
        assert!(!store.is_present(ControlFlag::Running));
        assert_eq!(
            store.history(),
            vec![
                MarkerEvent::Created(ControlFlag::Running),
                MarkerEvent::Deleted(ControlFlag::Running),
            ]
        );
    }

    #[test]
    fn test_guard_drop_clears_running_once() {
        let store = Arc::new(MemoryMarkerStore::new());
        let control = ControlPlane::new(store.clone());

        {
            let _guard = control.acquire().unwrap().expect("flag was free");
        }

        assert!(!store.is_present(ControlFlag::Running));
        assert_eq!(store.history().len(), 2);
    }

    #[test]
    fn test_acquire_refuses_when_running() {
        let store = Arc::new(MemoryMarkerStore::with_flags([ControlFlag::Running]));
        let control = ControlPlane::new(store.clone());

        assert!(control.acquire().unwrap().is_none());
        assert!(store.is_present(ControlFlag::Running));
        assert!(store.history().is_empty());
    }

    #[test]
    fn test_snapshot() {
        let store = Arc::new(MemoryMarkerStore::with_flags([
            ControlFlag::Stopped,
            ControlFlag::Failed,
        ]));
        let snapshot = ControlPlane::new(store).snapshot().unwrap();

        assert!(!snapshot.running);
        assert!(snapshot.get(ControlFlag::Stopped));
        assert!(snapshot.get(ControlFlag::Failed));
    }
}
