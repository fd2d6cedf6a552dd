use anyhow::{Context, Result};
use clap::Parser;
use roomcount::{EventBus, RoomcountConfig, Supervisor};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

#[derive(Parser, Debug)]
#[command(name = "roomcount")]
#[command(about = "People counting daemon sharing one camera with an operator setup workflow")]
#[command(version)]
#[command(long_about = "Supervises the counting worker: keeps exactly one worker alive while \
the camera is held for counting, exports occupancy samples to the latest document and the \
day-partitioned history, and serves a read-only query API.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "roomcount.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the daemon")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - report state but don't claim the camera
    #[arg(long, help = "Load configuration and report mode and setup state without starting")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily rolling files in this directory
    #[arg(long, value_name = "DIR", help = "Directory for rolling log files")]
    log_dir: Option<String>,

    /// Take the camera from an operator session left in configuration mode
    #[arg(long, help = "Release a configuration-mode token held by another session")]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(ExitCode::SUCCESS);
    }

    // Flushes the log file when main returns
    let _log_guard = init_logging(&args)?;

    info!("Starting roomcount v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = RoomcountConfig::load_from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        return Ok(ExitCode::FAILURE);
    }
    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    let event_bus = EventBus::default();
    let supervisor = Arc::new(Supervisor::from_config(&config, event_bus));

    if args.dry_run {
        let mode = supervisor.coordinator().current().await?;
        let missing = supervisor.coordinator().config_store().missing().await?;
        println!("✓ Dry run completed successfully");
        println!("  mode: {}", mode);
        if missing.is_empty() {
            println!("  setup: complete");
        } else {
            println!("  setup: missing {}", missing.join(", "));
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mode = supervisor.bootstrap(args.force).await.map_err(|e| {
        error!("Failed to settle camera mode: {}", e);
        e
    })?;
    info!("Camera mode at startup: {}", mode);

    #[cfg(feature = "http")]
    let api_task = if config.http.enabled {
        let state = roomcount::ApiState::from_config(&config)?.with_supervisor(Arc::clone(&supervisor));
        let server = roomcount::ApiServer::new(config.http.clone(), state);
        let shutdown = supervisor.cancellation_token();
        let handle = supervisor.shutdown_handle();
        Some(tokio::spawn(async move {
            if let Err(e) = server.start(shutdown).await {
                error!("Query API failed: {}", e);
                handle
                    .request(roomcount::ShutdownReason::Error(e.to_string()))
                    .await;
            }
        }))
    } else {
        None
    };

    let exit_code = supervisor.run().await.map_err(|e| {
        error!("Supervisor error during execution: {}", e);
        e
    })?;

    #[cfg(feature = "http")]
    if let Some(task) = api_task {
        if let Err(e) = task.await {
            tracing::warn!("Query API task ended abnormally: {}", e);
        }
    }

    info!("Roomcount exited with code: {}", exit_code);

    // Exit with appropriate code for systemd
    Ok(exit_status(exit_code))
}

fn exit_status(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

/// Daily rolling JSON log file; the guard flushes pending lines when dropped
fn log_file_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::daily(dir, "roomcount.log");
    Ok(tracing_appender::non_blocking(appender))
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
    };

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("roomcount={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![fmt_layer];
    let mut guard = None;

    if let Some(dir) = args.log_dir.as_deref() {
        let (writer, worker_guard) = log_file_writer(Path::new(dir))?;
        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed(),
        );
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Roomcount Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Any key can be overridden from the environment, e.g. ROOMCOUNT__HTTP__PORT=9090");
    println!();
    println!("{}", toml::to_string_pretty(&RoomcountConfig::default())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_log_file_is_flushed_when_guard_drops() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("logs");
        let (mut writer, guard) = log_file_writer(&dir).unwrap();

        writer.write_all(b"{\"message\":\"shutting down\"}\n").unwrap();
        drop(guard);

        let contents: String = std::fs::read_dir(&dir)
            .unwrap()
            .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect();
        assert!(contents.contains("shutting down"));
    }

    #[test]
    fn test_exit_status_maps_out_of_range_codes_to_failure() {
        assert_eq!(
            format!("{:?}", exit_status(0)),
            format!("{:?}", ExitCode::SUCCESS)
        );
        assert_eq!(
            format!("{:?}", exit_status(-1)),
            format!("{:?}", ExitCode::FAILURE)
        );
        assert_eq!(
            format!("{:?}", exit_status(256)),
            format!("{:?}", ExitCode::FAILURE)
        );
    }
}
