use crate::log::{log_level::LogLevel, log_msg::LogMsg, log_sink::LogSink};

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, SyncSender, TrySendError},
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

// -----------------------------------------------------------------------------
// COMPILE-TIME CONFIGURATION
// -----------------------------------------------------------------------------

/// Flush to disk every 100 lines if debugging/tracing (to see crashes near real-time).
#[cfg(feature = "log-debug")]
const FLUSH_BATCH_SIZE: u32 = 100;

/// Flush to disk every 1000 lines in production/default (to save I/O & CPU).
#[cfg(not(feature = "log-debug"))]
const FLUSH_BATCH_SIZE: u32 = 1_000;

// -----------------------------------------------------------------------------

/// Bounded, non-blocking logger that writes to a per-process log file.
///
/// A background worker thread consumes log messages from a bounded channel and
/// writes them to a file. Producers call `try_log` (never blocks; messages are
/// dropped when the queue is full). The `Logger` itself implements [`LogSink`],
/// so it can be wrapped in an `Arc` and handed to every engine component.
pub struct Logger {
    tx: SyncSender<LogMsg>,
    _thread: Option<thread::JoinHandle<()>>,
    file_path: PathBuf,
}

impl Logger {
    /// Creates a `logs/` directory next to the executable and starts the logger there.
    #[must_use]
    pub fn start_default(app_name: Option<&str>, cap: usize) -> Self {
        let base = exe_dir_fallback_cwd().join("logs");
        Self::start_in_dir(base, app_name, cap)
    }

    /// Starts the logger in a specific directory.
    ///
    /// Creates the target directory if it is missing, generates a unique
    /// filename based on timestamp and PID, and spawns the worker thread.
    pub fn start_in_dir<D: AsRef<Path>>(dir: D, app_name: Option<&str>, cap: usize) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);

        let ts = timestamp_for_filename();
        let pid = std::process::id();

        let fname = if let Some(name) = app_name {
            format!("{}-{}-pid{}.log", name, ts, pid)
        } else {
            format!("{}-pid{}.log", ts, pid)
        };

        let file_path = dir.join(&fname);

        let (tx, rx) = mpsc::sync_channel::<LogMsg>(cap);

        let file_path_clone = file_path.clone();

        let _thread = thread::Builder::new()
            .name("logger-worker".into())
            .spawn(move || {
                // Try target file -> temp file -> sink (never panic).
                let writer: Box<dyn Write + Send> = if let Ok(f) = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&file_path_clone)
                {
                    Box::new(f)
                } else {
                    let fallback = std::env::temp_dir().join("rtcmux-fallback.log");
                    match OpenOptions::new().create(true).append(true).open(&fallback) {
                        Ok(f) => Box::new(f),
                        Err(_) => Box::new(io::sink()),
                    }
                };

                let mut out: BufWriter<Box<dyn Write + Send>> = BufWriter::new(writer);
                let mut lines_written: u32 = 0;

                while let Ok(m) = rx.recv() {
                    let _ = writeln!(
                        &mut out,
                        "[{:?}] {} {} | {}",
                        m.level, m.ts_ms, m.target, m.text
                    );
                    lines_written = lines_written.wrapping_add(1);

                    // Flush periodically to ensure data persists on crash.
                    if lines_written.is_multiple_of(FLUSH_BATCH_SIZE) {
                        let _ = out.flush();
                    }
                }

                let _ = out.flush();
            })
            .ok();

        Self {
            tx,
            _thread,
            file_path,
        }
    }

    /// Attempts to enqueue a log message without blocking the current thread.
    ///
    /// # Errors
    /// Returns the rejected message if the internal queue is full.
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), TrySendError<LogMsg>> {
        self.tx
            .try_send(LogMsg::new(level, text, target, now_millis()))
    }

    /// Returns the path of the active log file.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

impl LogSink for Logger {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        let _ = self.try_log(level, msg, target);
    }
}

pub(crate) fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Locates the directory next to the executable (target/{debug,release}),
/// or falls back to the current working directory on error.
fn exe_dir_fallback_cwd() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Generates a human-readable timestamp for filenames without external dependencies.
///
/// Output Format: `YYYYMMDD_HHMMSS` (e.g., `20251102_023045`)
fn timestamp_for_filename() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    unix_to_utc(secs).map_or_else(
        |_| format!("unix_{secs}"),
        |tm| {
            format!(
                "{:04}{:02}{:02}_{:02}{:02}{:02}",
                tm.year, tm.mon, tm.day, tm.hour, tm.min, tm.sec
            )
        },
    )
}

#[derive(Clone, Copy, Debug)]
struct SimpleUtc {
    year: i32,
    mon: u32,
    day: u32,
    hour: u32,
    min: u32,
    sec: u32,
}

#[derive(Debug)]
enum UtcConvError {
    Year,
    Month,
    Day,
}

/// Minimal UTC conversion (civil time) to avoid importing `chrono`.
#[allow(clippy::missing_const_for_fn, clippy::many_single_char_names)]
fn unix_to_utc(mut s: u64) -> Result<SimpleUtc, UtcConvError> {
    use std::convert::TryFrom;

    let sec = (s % 60) as u32;
    s /= 60;
    let min = (s % 60) as u32;
    s /= 60;
    let hour = (s % 24) as u32;
    s /= 24;

    // Use i128 to prevent overflow during intermediate calculations.
    let z: i128 = i128::from(s) + 719_468;

    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097; // [0, 146096]
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = doy - (153 * mp + 2) / 5 + 1; // [1, 31]
    let m = mp + if mp < 10 { 3 } else { -9 }; // [1, 12]

    let year_i = y + i128::from(m <= 2);

    let year = i32::try_from(year_i).map_err(|_| UtcConvError::Year)?;
    let mon = u32::try_from(m).map_err(|_| UtcConvError::Month)?;
    let day = u32::try_from(d).map_err(|_| UtcConvError::Day)?;

    Ok(SimpleUtc {
        year,
        mon,
        day,
        hour,
        min,
        sec,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_logger_writes_to_file_ok() {
        let dir = std::env::temp_dir().join(format!("rtcmux-logtest-{}", std::process::id()));
        let logger = Logger::start_in_dir(&dir, Some("test"), 64);
        logger
            .try_log(LogLevel::Info, "hello", module_path!())
            .unwrap();
        assert!(logger.file_path().starts_with(&dir));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unix_to_utc_epoch_ok() {
        let tm = unix_to_utc(0).unwrap();
        assert_eq!(tm.year, 1970);
        assert_eq!(tm.mon, 1);
        assert_eq!(tm.day, 1);
    }
}
