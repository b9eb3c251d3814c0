//! Logging system configuration and initialization
//!
//! - Console and/or file output, optionally JSON
//! - Log files stored next to the executable, previous file rotated on start-up
//! - Timestamps in Paris local time (CET/CEST)

use anyhow::{Result, anyhow};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, TimeZone, Utc, Weekday};
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

// Keeps the non-blocking writers alive for the whole process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

const CET_SECONDS: i32 = 3600;
const CEST_SECONDS: i32 = 2 * 3600;

/// Targets capped at `warn` unless the configured level is `trace`
const NOISY_TARGETS: [&str; 4] = ["chromiumoxide", "tungstenite", "hyper", "tokio"];

/// Last Sunday of a month, at 01:00 UTC (EU summer-time switch instant)
fn last_sunday_switch(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut day = first_of_next.pred_opt()?;
    while day.weekday() != Weekday::Sun {
        day = day.pred_opt()?;
    }
    Some(Utc.from_utc_datetime(&day.and_hms_opt(1, 0, 0)?))
}

/// UTC offset of Europe/Paris at the given instant
pub fn paris_offset(at: DateTime<Utc>) -> FixedOffset {
    let year = at.year();
    let summer = match (last_sunday_switch(year, 3), last_sunday_switch(year, 10)) {
        (Some(start), Some(end)) => at >= start && at < end,
        _ => false,
    };
    let seconds = if summer { CEST_SECONDS } else { CET_SECONDS };
    FixedOffset::east_opt(seconds).unwrap_or_else(|| Utc.fix())
}

/// Current Paris local time
pub fn paris_now() -> DateTime<FixedOffset> {
    let now = Utc::now();
    now.with_timezone(&paris_offset(now))
}

struct ParisTimeFormatter;

impl FormatTime for ParisTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", paris_now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Rename the previous run's log file with its modification timestamp
fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str) -> Result<()> {
    let log_file_path = log_dir.join(log_file_name);
    if !log_file_path.exists() {
        return Ok(());
    }

    let metadata = std::fs::metadata(&log_file_path)
        .map_err(|e| anyhow!("Failed to get log file metadata: {e}"))?;
    let modified: DateTime<Utc> = metadata
        .modified()
        .unwrap_or_else(|_| std::time::SystemTime::now())
        .into();
    let local = modified.with_timezone(&paris_offset(modified));

    let file_stem = log_file_name.trim_end_matches(".log");
    let rotated_name = format!("{file_stem}.{}.log", local.format("%Y%m%dT%H%M%S"));
    let rotated_path = log_dir.join(&rotated_name);

    std::fs::rename(&log_file_path, &rotated_path).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {e}",
            log_file_path.display(),
            rotated_path.display()
        )
    })?;
    Ok(())
}

/// Delete the oldest `.log` files beyond `max_files`
fn cleanup_old_logs(log_dir: &Path, max_files: usize) -> Result<usize> {
    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path.extension().is_some_and(|ext| ext == "log");
        if !path.is_file() || !is_log {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            log_files.push((path, modified));
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(max_files) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

/// Build the filter: `RUST_LOG` wins, otherwise the configured level with
/// noisy dependencies capped unless tracing everything.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let tracing_all = config.level.eq_ignore_ascii_case("trace");
    let mut directives = vec![config.level.clone()];
    if !tracing_all {
        directives.extend(NOISY_TARGETS.iter().map(|target| format!("{target}=warn")));
    }
    for (module, level) in &config.module_filters {
        if tracing_all && NOISY_TARGETS.contains(&module.as_str()) {
            continue;
        }
        directives.push(format!("{module}={level}"));
    }

    EnvFilter::try_new(directives.join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging with custom configuration
///
/// Set `RUST_LOG` to bypass the configured filters entirely:
/// ```bash
/// RUST_LOG="debug,chromiumoxide=debug" price-sentinel scrape catalog.csv
/// ```
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let log_dir = get_log_directory();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {e}", log_dir))?;
        rotate_existing_log_file(&log_dir, &config.file_name)?;
        if config.auto_cleanup_logs {
            cleanup_old_logs(&log_dir, config.max_files as usize)?;
        }

        let (writer, guard) = non_blocking(rolling::never(&log_dir, &config.file_name));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(guard);

        let file_layer = if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(writer)
                .with_timer(ParisTimeFormatter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(writer)
                .with_timer(ParisTimeFormatter)
                .with_target(false)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
    }

    if config.console_output {
        layers.push(
            fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_timer(ParisTimeFormatter)
                .with_target(false)
                .boxed(),
        );
    }

    if layers.is_empty() {
        return Err(anyhow!("No logging output configured"));
    }
    Registry::default().with(layers).with(build_filter(config)).try_init()?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log file: {:?}", log_dir.join(&config.file_name));
    }
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Price Sentinel ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    info!("Log directory: {:?}", get_log_directory());
}
