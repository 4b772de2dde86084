//! # Logging Setup
//!
//! `fern` dispatch shared by the binaries: one timestamped log file per run
//! (older files of the same app are removed) plus an optional console chain.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Where console log lines go, and from which level up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLog {
    Off,
    /// Mirror records at the file level to stdout.
    Stdout,
    /// Mirror only records at or above this level to stderr.
    Stderr(log::LevelFilter),
}

/// Maps a level name onto a filter; unknown names mean `Info`.
pub fn parse_level(level: &str) -> log::LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Installs the global logger and returns the path of the new log file.
pub fn setup_logging(app_name: &str, log_dir: &Path, log_level: &str, console: ConsoleLog) -> Result<PathBuf> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    // Keep only the newest log of this app before starting a new one.
    cleanup_old_logs(app_name, log_dir, 0)?;

    let log_file_name = format!("{}_{}.log", app_name, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(log_file_name);
    let level = parse_level(log_level);

    let file_chain = fern::Dispatch::new()
        .level(level)
        .chain(fern::log_file(&log_path)?);

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(file_chain);

    dispatch = match console {
        ConsoleLog::Off => dispatch,
        ConsoleLog::Stdout => dispatch.chain(std::io::stdout()),
        ConsoleLog::Stderr(min) => dispatch.chain(fern::Dispatch::new().level(min).chain(std::io::stderr())),
    };

    dispatch.apply()?;
    Ok(log_path)
}

/// Deletes `<app_name>_*.log` files in `log_dir`, newest first, keeping `keep`.
pub fn cleanup_old_logs(app_name: &str, log_dir: &Path, keep: usize) -> Result<usize> {
    let prefix = format!("{}_", app_name);
    let mut entries: Vec<(std::time::SystemTime, PathBuf)> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "log")
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix))
        })
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .collect();

    // Newest first; the file name carries the timestamp, so it breaks ties.
    entries.sort_by(|a, b| b.cmp(a));

    let mut removed = 0;
    for (_, path) in entries.iter().skip(keep) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}
