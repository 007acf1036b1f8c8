//! Unified test utilities for cronsync tests

use async_trait::async_trait;
use cronsync_types::{Copier, CopyError, CopyOutcome, CopyTask};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Scripted behaviour for one source
#[derive(Debug, Clone, Copy, Default)]
struct Script {
    delay: Duration,
    exit_code: Option<i32>,
}

/// Start or end of one scripted copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyEvent {
    /// The copy of this source started
    Started(PathBuf),
    /// The copy of this source finished
    Finished(PathBuf),
}

/// Copier whose result and duration are scripted per source path
///
/// Records the order in which copies start and finish and the highest
/// number of copies running at once.
#[derive(Debug, Default)]
pub struct ScriptedCopier {
    scripts: HashMap<PathBuf, Script>,
    default_delay: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<PathBuf>>,
    finished: Mutex<Vec<PathBuf>>,
    events: Mutex<Vec<CopyEvent>>,
}

impl ScriptedCopier {
    /// Copier where every task succeeds immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to sources without their own script
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Make `source` take `delay` to complete
    pub fn delay<P: Into<PathBuf>>(mut self, source: P, delay: Duration) -> Self {
        self.scripts.entry(source.into()).or_default().delay = delay;
        self
    }

    /// Make `source` fail with `exit_code`
    pub fn fail<P: Into<PathBuf>>(mut self, source: P, exit_code: i32) -> Self {
        self.scripts.entry(source.into()).or_default().exit_code = Some(exit_code);
        self
    }

    /// Sources in the order their copies started
    pub fn started(&self) -> Vec<PathBuf> {
        lock(&self.started).clone()
    }

    /// Sources in the order their copies finished
    pub fn finished(&self) -> Vec<PathBuf> {
        lock(&self.finished).clone()
    }

    /// Starts and finishes interleaved in the order they happened
    pub fn events(&self) -> Vec<CopyEvent> {
        lock(&self.events).clone()
    }

    /// Highest number of copies observed running at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Check whether a copy of `source` was attempted
    pub fn was_attempted(&self, source: &Path) -> bool {
        lock(&self.started).iter().any(|started| started == source)
    }
}

#[async_trait]
impl Copier for ScriptedCopier {
    async fn copy(&self, task: &CopyTask) -> Result<CopyOutcome, CopyError> {
        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        lock(&self.started).push(task.source.clone());
        lock(&self.events).push(CopyEvent::Started(task.source.clone()));

        let script = self.scripts.get(&task.source).copied().unwrap_or(Script {
            delay: self.default_delay,
            exit_code: None,
        });
        if script.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(script.delay).await;
        }

        self.current.fetch_sub(1, Ordering::SeqCst);
        lock(&self.finished).push(task.source.clone());
        lock(&self.events).push(CopyEvent::Finished(task.source.clone()));

        match script.exit_code {
            Some(code) => Err(CopyError::NonZeroExit { code }),
            None => Ok(CopyOutcome {
                duration: script.delay,
                output_lines: 0,
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Log lines captured from a thread-scoped subscriber
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Empty capture
    pub fn new() -> Self {
        Self::default()
    }

    /// Route this thread's events into the capture until the guard drops
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Captured lines
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&lock(&self.buffer))
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Check whether a line at `level` contains `text`
    pub fn contains(&self, level: &str, text: &str) -> bool {
        self.lines()
            .iter()
            .any(|line| line.contains(level) && line.contains(text))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Writer handed to the subscriber by [`LogCapture`]
#[derive(Debug)]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.buffer).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Temporary directory with a flags directory, sources and a destination base
#[derive(Debug)]
pub struct TestLayout {
    /// Root of the layout, removed on drop
    pub root: TempDir,
}

impl TestLayout {
    /// Create an empty layout
    pub fn new() -> std::io::Result<Self> {
        let root = TempDir::new()?;
        fs::create_dir(root.path().join("flags"))?;
        fs::create_dir(root.path().join("backup"))?;
        Ok(Self { root })
    }

    /// Directory holding the control flags
    pub fn flags_dir(&self) -> PathBuf {
        self.root.path().join("flags")
    }

    /// Path of a marker file
    pub fn marker(&self, name: &str) -> PathBuf {
        self.flags_dir().join(name)
    }

    /// Destination base shared by all tasks
    pub fn backup_dir(&self) -> PathBuf {
        self.root.path().join("backup")
    }

    /// Create a source directory with one file in it
    pub fn add_source(&self, name: &str) -> std::io::Result<PathBuf> {
        let source = self.root.path().join("sources").join(name);
        fs::create_dir_all(&source)?;
        fs::write(source.join("data.txt"), name.as_bytes())?;
        Ok(source)
    }

    /// Tasks copying each named source into the backup directory
    pub fn tasks(&self, names: &[&str]) -> std::io::Result<Vec<CopyTask>> {
        names
            .iter()
            .map(|name| Ok(CopyTask::new(self.add_source(name)?, self.backup_dir())))
            .collect()
    }
}
