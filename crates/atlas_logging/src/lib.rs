//! Tracing setup for the `atlas` CLI.
//!
//! Events land in `$ATLAS_HOME/logs/<app>.log`, capped in size with a few
//! older generations kept beside it. Stderr only sees warnings unless
//! `verbose` is set.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "atlas=info,atlas_scan=info,atlas_connect=info,atlas_db=warn";
const HOME_ENV: &str = "ATLAS_HOME";
/// Live file plus two rolled generations
const KEEP_GENERATIONS: usize = 3;
const ROLL_AT_BYTES: u64 = 10 * 1024 * 1024;

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Install the global subscriber: everything at the configured filter goes
/// to the log file, the console gets `warn` (or `debug` when verbose).
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let dir = atlas_home().join("logs");
    let sink = CappedLog::open(&dir, config.app_name, KEEP_GENERATIONS, ROLL_AT_BYTES)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
    let live = sink.live_path();

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_level = if config.verbose { "debug" } else { "warn" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(sink)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(EnvFilter::new(console_level)),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::debug!(file = %live.display(), "Logging initialized");
    Ok(())
}

/// `$ATLAS_HOME`, or `~/.atlas_catalog` when unset.
pub fn atlas_home() -> PathBuf {
    match std::env::var_os(HOME_ENV) {
        Some(path) => PathBuf::from(path),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".atlas_catalog"),
    }
}

struct LogFile {
    handle: File,
    len: u64,
}

/// Shared, size-capped log file. Clones write to the same file.
#[derive(Clone)]
struct CappedLog {
    dir: PathBuf,
    stem: String,
    keep: usize,
    cap: u64,
    current: Arc<Mutex<LogFile>>,
}

impl CappedLog {
    fn open(dir: &Path, app_name: &str, keep: usize, cap: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stem: String = app_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let live = generation_path(dir, &stem, 0);
        let mut file = open_append(&live)?;
        if file.len > cap {
            drop(file);
            shift_generations(dir, &stem, keep.max(1))?;
            file = open_append(&live)?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            stem,
            keep: keep.max(1),
            cap,
            current: Arc::new(Mutex::new(file)),
        })
    }

    fn live_path(&self) -> PathBuf {
        generation_path(&self.dir, &self.stem, 0)
    }
}

impl Write for CappedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .current
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?;
        if file.len + buf.len() as u64 > self.cap {
            file.handle.flush().ok();
            shift_generations(&self.dir, &self.stem, self.keep)?;
            *file = open_append(&self.live_path())?;
        }
        let n = file.handle.write(buf)?;
        file.len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.current.lock() {
            Ok(mut file) => file.handle.flush(),
            Err(_) => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for CappedLog {
    type Writer = CappedLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Generation 0 is the live file, `n` is `<stem>.log.n`.
fn generation_path(dir: &Path, stem: &str, generation: usize) -> PathBuf {
    match generation {
        0 => dir.join(format!("{}.log", stem)),
        n => dir.join(format!("{}.log.{}", stem, n)),
    }
}

/// Rename every generation one step older and drop the oldest.
fn shift_generations(dir: &Path, stem: &str, keep: usize) -> io::Result<()> {
    let oldest = generation_path(dir, stem, keep - 1);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for generation in (0..keep - 1).rev() {
        let from = generation_path(dir, stem, generation);
        if from.exists() {
            fs::rename(&from, generation_path(dir, stem, generation + 1))?;
        }
    }
    Ok(())
}

fn open_append(path: &Path) -> io::Result<LogFile> {
    let handle = OpenOptions::new().create(true).append(true).open(path)?;
    let len = handle.metadata()?.len();
    Ok(LogFile { handle, len })
}
