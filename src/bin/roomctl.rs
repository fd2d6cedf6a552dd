use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use roomcount::{
    aggregate::parse_instant, frame_source, CountAggregator, DirectionConfig, EntryDirection,
    Granularity, LatestStore, ModeCoordinator, RangePreset, RegionConfig, RoomcountConfig,
    SetupSession, TimeRange, TimeSeries,
};
use serde_json::json;
use tracing::{debug, info};

/// Operator tool for the camera mode, the counting setup and the count history
#[derive(Parser, Debug)]
#[command(name = "roomctl")]
#[command(about = "Configure people counting and query the count history")]
#[command(version)]
struct Args {
    /// Path to roomcount configuration file
    #[arg(short = 'c', long, default_value = "roomcount.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the camera mode, setup state and latest count
    Status,
    /// Take the camera for configuration (stops counting)
    Configure,
    /// Capture a reference still while configuring
    Snapshot,
    /// Save the counting region in reference image pixels
    Region { x: i32, y: i32, w: i32, h: i32 },
    /// Save the entry direction (left_to_right or right_to_left)
    Direction {
        entry: Option<EntryDirection>,
        /// Entry angle in degrees (0 or 180)
        #[arg(long)]
        angle: Option<i32>,
    },
    /// Print the saved region and direction
    Show,
    /// Delete the saved region and direction
    Clear,
    /// Finish configuration and start counting
    Count,
    /// Give the camera back without counting
    Release,
    /// Restart a counting worker that failed; the daemon picks this up on
    /// its next poll
    Retry,
    /// Print the latest exported count
    Latest,
    /// Aggregate the count history
    Query {
        /// Named range: today, yesterday, last_week, last_month, last_year, all
        #[arg(long, conflicts_with_all = ["start", "end"])]
        preset: Option<RangePreset>,
        /// Range start (RFC 3339 or YYYY-MM-DD in the query timezone)
        #[arg(long)]
        start: Option<String>,
        /// Range end, exclusive
        #[arg(long)]
        end: Option<String>,
        /// Bucket width: 10min, 30min, 1h, 1d, 1w, 1mo
        #[arg(long)]
        granularity: Option<Granularity>,
        /// Print raw history rows instead of buckets
        #[arg(long, conflicts_with = "csv")]
        rows: bool,
        /// Write the series as CSV to this file
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(format!("roomcount={level},roomctl={level}"))
                }),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = RoomcountConfig::load_from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;
    config.validate().context("invalid configuration")?;
    debug!("Using mode token {}", config.coordination.mode_token_path);

    let coordinator = ModeCoordinator::from_config(&config);

    match args.command {
        Command::Status => status(&config, &coordinator).await,
        Command::Configure => {
            let previous = session(&config, coordinator)?.begin().await?;
            println!("configuring (was {})", previous);
            Ok(())
        }
        Command::Snapshot => {
            let mut session = session(&config, coordinator)?;
            let frame = session.capture_reference().await?;
            println!(
                "reference image {}x{} ({} bytes) written to {}",
                frame.width,
                frame.height,
                frame.size(),
                session.reference_image_path().display()
            );
            Ok(())
        }
        Command::Region { x, y, w, h } => {
            let region = RegionConfig::new(x, y, w, h);
            session(&config, coordinator)?.save_region(&region).await?;
            println!("region saved: {}", serde_json::to_string(&region)?);
            Ok(())
        }
        Command::Direction { entry, angle } => {
            let direction = DirectionConfig::from_parts(entry, angle)?;
            session(&config, coordinator)?
                .save_direction(&direction)
                .await?;
            println!("direction saved: {} ({} degrees)", direction.entry, direction.angle);
            Ok(())
        }
        Command::Show => {
            let store = coordinator.config_store();
            let body = json!({
                "region": store.load_region().await?,
                "direction": store.load_direction().await?,
                "missing": store.missing().await?,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Command::Clear => {
            session(&config, coordinator)?.clear().await?;
            println!("region and direction cleared");
            Ok(())
        }
        Command::Count => {
            session(&config, coordinator)?.finish().await?;
            println!("counting");
            Ok(())
        }
        Command::Retry => {
            roomcount::request_retry(&config.retry_request_path()).await?;
            println!("retry requested");
            Ok(())
        }
        Command::Release => {
            match coordinator.release().await? {
                Some(previous) => println!("idle (was {})", previous),
                None => println!("idle (unreadable token cleared)"),
            }
            Ok(())
        }
        Command::Latest => {
            let latest = LatestStore::new(&config.storage.latest_path)
                .read()
                .await?
                .ok_or_else(|| anyhow!("no count exported yet"))?;
            println!("{}", serde_json::to_string_pretty(&latest)?);
            Ok(())
        }
        Command::Query {
            preset,
            start,
            end,
            granularity,
            rows,
            csv,
        } => {
            let aggregator = CountAggregator::from_config(&config)?;
            let tz = aggregator.timezone();
            let range = match preset {
                Some(preset) => preset.resolve(Utc::now(), tz),
                None => TimeRange::new(
                    start
                        .as_deref()
                        .map(|value| parse_instant(value, tz))
                        .transpose()
                        .map_err(|e| anyhow!(e))?,
                    end.as_deref()
                        .map(|value| parse_instant(value, tz))
                        .transpose()
                        .map_err(|e| anyhow!(e))?,
                ),
            };

            if rows {
                for row in aggregator.rows(range).await? {
                    println!("{}", serde_json::to_string(&row)?);
                }
                return Ok(());
            }

            let series = match granularity.or(preset.map(|p| p.granularity())) {
                Some(granularity) => aggregator.query(range, granularity).await?,
                None => aggregator.query_auto(range).await?,
            };

            match csv {
                Some(path) => {
                    tokio::fs::write(&path, series.to_csv(tz))
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!("Wrote {} buckets to {}", series.buckets.len(), path.display());
                    println!("{} buckets written to {}", series.buckets.len(), path.display());
                }
                None => print_series(&series, tz),
            }
            Ok(())
        }
    }
}

fn session(config: &RoomcountConfig, coordinator: ModeCoordinator) -> Result<SetupSession> {
    let camera = frame_source(&config.camera)?;
    Ok(SetupSession::new(
        coordinator,
        camera,
        &config.storage.reference_image_path,
    ))
}

async fn status(config: &RoomcountConfig, coordinator: &ModeCoordinator) -> Result<()> {
    let mode = coordinator.current().await?;
    let missing = coordinator.config_store().missing().await?;
    let latest = LatestStore::new(&config.storage.latest_path).read().await?;

    println!("mode:   {}", mode);
    if missing.is_empty() {
        println!("setup:  complete");
    } else {
        println!("setup:  missing {}", missing.join(", "));
    }
    match latest {
        Some(latest) => println!(
            "latest: in={} out={} current={} at {}",
            latest.in_count, latest.out_count, latest.current_count, latest.timestamp
        ),
        None => println!("latest: none"),
    }
    Ok(())
}

fn print_series(series: &TimeSeries, tz: chrono_tz::Tz) {
    if series.is_empty() {
        println!("no samples in range");
        return;
    }

    println!(
        "{:<25} {:>8} {:>8} {:>8} {:>8}",
        "bucket", "in", "out", "current", "entered"
    );
    for bucket in &series.buckets {
        println!(
            "{:<25} {:>8} {:>8} {:>8} {:>8}",
            bucket.start.with_timezone(&tz).to_rfc3339(),
            bucket.in_count,
            bucket.out_count,
            bucket.current_count,
            bucket.in_delta
        );
    }
    println!(
        "{} buckets ({}), {} entered, peak occupancy {}",
        series.buckets.len(),
        series.granularity,
        series.total_entered(),
        series.peak_occupancy()
    );
}

