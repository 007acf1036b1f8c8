//! cronsync - run a list of rsync copies from cron, one run at a time
//!
//! Each invocation copies every configured source directory into its
//! destination with a bounded number of concurrent rsync processes. Marker
//! files coordinate overlapping invocations and let an operator pause runs.

mod display;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use cronsync_config::{Config, ConfigError, ConfigLoader, ConfigResult};
use cronsync_engine::{ControlPlane, SyncEngine};
use cronsync_types::{ControlFlag, ExitStatus};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

/// cronsync - bounded-concurrency rsync orchestrator
#[derive(Parser, Debug)]
#[command(
    name = "cronsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Run a list of rsync copies with bounded concurrency",
    long_about = "cronsync copies a list of source directories into their destinations\n\
                  using rsync, running at most a configured number of copies at once.\n\
                  Marker files prevent overlapping runs, pause scheduling and record failures."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - errors only
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run the configured task list once (default)
    Run,
    /// Show the control flags
    Status,
    /// Create the stopped flag so future runs exit without copying
    Pause,
    /// Remove the stopped flag
    Resume,
    /// Remove the failed flag left by an unsuccessful run
    ClearFailed,
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
        /// Write the configuration to a file instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_cli(cli).await {
        Ok(status) => ExitCode::from(u8::try_from(status.code()).unwrap_or(1)),
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::from(1)
        }
    }
}

async fn run_cli(cli: Cli) -> Result<ExitStatus> {
    let command = cli.command.unwrap_or(Commands::Run);
    let loaded = ConfigLoader::load(cli.config.as_deref());
    let config = config_for(&command, loaded).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })?;

    // Held until return so the file writer flushes
    let _log_guard = init_logging(cli.debug, cli.quiet, &config)?;

    info!("cronsync v{} starting", env!("CARGO_PKG_VERSION"));

    match command {
        Commands::Run => run_command(config).await,
        Commands::Status => status_command(&config),
        Commands::Pause => flag_command(&config, ControlFlag::Stopped, true),
        Commands::Resume => flag_command(&config, ControlFlag::Stopped, false),
        Commands::ClearFailed => flag_command(&config, ControlFlag::Failed, false),
        Commands::Config { default, output } => {
            config_command(&config, default, output.as_deref())?;
            Ok(ExitStatus::Success)
        }
    }
}

/// Only `config --default` may proceed without a configuration file
fn config_for(command: &Commands, loaded: ConfigResult<Config>) -> ConfigResult<Config> {
    match (command, loaded) {
        (Commands::Config { default: true, .. }, Err(ConfigError::MissingRequired { .. })) => {
            Ok(Config::default())
        }
        (_, loaded) => loaded,
    }
}

fn init_logging(debug: bool, quiet: bool, config: &Config) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Command-line flags beat RUST_LOG, which beats the configured level
    let forced = if debug {
        Some("debug")
    } else if quiet {
        Some("error")
    } else {
        None
    };

    let filter = match (forced, EnvFilter::try_from_default_env()) {
        (None, Ok(filter)) => filter,
        (forced, _) => {
            let level = forced.unwrap_or(config.logging.level.as_str());
            EnvFilter::try_new(level).with_context(|| format!("Invalid log level '{}'", level))?
        }
    };

    let console_layer = if config.logging.json_format {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    let (file_layer, guard) = match &config.logging.log_file {
        Some(path) => {
            let (directory, file_name) = split_log_path(path)?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path '{}' has no file name", path.display()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((directory, PathBuf::from(file_name)))
}

async fn run_command(config: Config) -> Result<ExitStatus> {
    let engine = SyncEngine::with_config(config).context("Failed to initialize sync engine")?;
    let status = engine.run_until(shutdown_signal()).await;

    if status.is_failure() {
        error!("Run ended with {:?}", status);
    }
    Ok(status)
}

fn control_plane(config: &Config) -> Result<ControlPlane> {
    let engine =
        SyncEngine::with_config(config.clone()).context("Failed to initialize sync engine")?;
    Ok(engine.control().clone())
}

fn status_command(config: &Config) -> Result<ExitStatus> {
    let control = control_plane(config)?;
    let snapshot = control.snapshot().context("Failed to read control flags")?;
    display::display_flag_status(&control, &snapshot);
    Ok(ExitStatus::Success)
}

fn flag_command(config: &Config, flag: ControlFlag, present: bool) -> Result<ExitStatus> {
    let control = control_plane(config)?;
    if present {
        control
            .set(flag)
            .with_context(|| format!("Failed to set {} flag", flag))?;
    } else {
        control
            .clear(flag)
            .with_context(|| format!("Failed to clear {} flag", flag))?;
    }
    info!("{} flag {}", flag, if present { "set" } else { "cleared" });
    display::display_flag_change(&control, flag, present);
    Ok(ExitStatus::Success)
}

fn config_command(config: &Config, default: bool, output: Option<&Path>) -> Result<()> {
    let default_config;
    let shown = if default {
        default_config = Config::default();
        &default_config
    } else {
        config
    };

    match output {
        Some(path) => {
            ConfigLoader::save_to_file(shown, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} Configuration written to {}",
                style("✓").green(),
                style(path.display()).cyan()
            );
        }
        None => display::display_config(shown, default)?,
    }
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}
