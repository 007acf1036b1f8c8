//! Copier implementation backed by an external rsync process

use async_trait::async_trait;
use cronsync_config::RsyncConfig;
use cronsync_types::{CopyError, CopyOutcome, CopyTask, Copier};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Log target for lines produced by the copier process
pub const COPIER_LOG_TARGET: &str = "cronsync::rsync";

/// Configuration for the rsync copier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopierConfig {
    /// Program to execute
    pub binary: PathBuf,
    /// Arguments placed before the source and destination
    pub options: Vec<String>,
}

impl CopierConfig {
    /// Create copier config from the rsync section
    pub fn from_config(config: &RsyncConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            options: config.option_args(),
        }
    }
}

impl Default for CopierConfig {
    fn default() -> Self {
        Self::from_config(&RsyncConfig::default())
    }
}

/// Copier that validates the task and runs `rsync <options> <source>/ <destination>`
///
/// The child process is not killed when the copier future is dropped, so an
/// interrupted run leaves in-flight copies to finish on their own.
#[derive(Debug, Clone, Default)]
pub struct RsyncCopier {
    config: CopierConfig,
}

impl RsyncCopier {
    /// Create a new copier
    pub fn new(config: CopierConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    pub fn config(&self) -> &CopierConfig {
        &self.config
    }

    fn command(&self, task: &CopyTask, destination: &Path) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .args(&self.config.options)
            .arg(source_argument(&task.source))
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        command
    }
}

#[async_trait]
impl Copier for RsyncCopier {
    async fn copy(&self, task: &CopyTask) -> Result<CopyOutcome, CopyError> {
        let start = Instant::now();
        let destination = prepare_destination(task).await?;

        let mut child = self
            .command(task, &destination)
            .spawn()
            .map_err(|e| CopyError::Spawn {
                program: self.config.binary.display().to_string(),
                message: e.to_string(),
            })?;

        debug!(
            "Spawned {} (pid {:?}) for {}",
            self.config.binary.display(),
            child.id(),
            task
        );

        let source = task.source.display().to_string();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Pipes are drained while waiting so a chatty copier cannot block on a full pipe
        let (stdout_lines, stderr_lines, status) = tokio::join!(
            forward_lines(stdout, &source, false),
            forward_lines(stderr, &source, true),
            child.wait()
        );
        let status = status?;

        if status.success() {
            Ok(CopyOutcome {
                duration: start.elapsed(),
                output_lines: stdout_lines + stderr_lines,
            })
        } else {
            match status.code() {
                Some(code) => Err(CopyError::NonZeroExit { code }),
                None => Err(CopyError::Terminated),
            }
        }
    }

    fn name(&self) -> &str {
        "rsync"
    }
}

/// Validate a task and make sure its destination directory exists
///
/// The source and the destination base must both be existing directories,
/// and the source must end in a named component (`/` and `..` do not): its
/// destination would otherwise be the destination base itself. The
/// destination path is created when missing.
pub async fn prepare_destination(task: &CopyTask) -> Result<PathBuf, CopyError> {
    if !is_directory(&task.source).await {
        return Err(CopyError::SourceMissing {
            path: task.source.clone(),
        });
    }

    if !is_directory(&task.destination_base).await {
        return Err(CopyError::DestinationBaseMissing {
            path: task.destination_base.clone(),
        });
    }

    if task.source.file_name().is_none() {
        return Err(CopyError::DestinationCreateFailed {
            path: task.destination_base.clone(),
            message: format!(
                "source '{}' has no final path component",
                task.source.display()
            ),
        });
    }

    let destination = task.destination_path();
    match fs::metadata(&destination).await {
        Ok(metadata) if metadata.is_dir() => Ok(destination),
        Ok(_) => Err(CopyError::DestinationCreateFailed {
            path: destination,
            message: "path exists and is not a directory".to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => match fs::create_dir(&destination).await {
            Ok(()) => {
                info!("Created destination directory {}", destination.display());
                Ok(destination)
            }
            // Another job with the same destination won the race
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(destination),
            Err(e) => Err(CopyError::DestinationCreateFailed {
                path: destination,
                message: e.to_string(),
            }),
        },
        Err(e) => Err(CopyError::DestinationCreateFailed {
            path: destination,
            message: e.to_string(),
        }),
    }
}

async fn is_directory(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

/// Source argument with a trailing separator so rsync copies the contents
fn source_argument(source: &Path) -> OsString {
    let mut argument = source.as_os_str().to_os_string();
    if !source.to_string_lossy().ends_with('/') {
        argument.push("/");
    }
    argument
}

async fn forward_lines<R>(reader: Option<R>, source: &str, is_stderr: bool) -> u64
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return 0;
    };

    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                if is_stderr {
                    warn!(target: COPIER_LOG_TARGET, source, "{}", line);
                } else {
                    info!(target: COPIER_LOG_TARGET, source, "{}", line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(target: COPIER_LOG_TARGET, source, "Failed to read copier output: {}", e);
                break;
            }
        }
    }
    count
}
