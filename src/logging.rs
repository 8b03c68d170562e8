//! Size-capped debug log in the temp dir, plus a crash log written from the panic hook.
//!
//! Nothing is written unless `--logs` is given; device text and commands only
//! reach the log with `--log-content`.

use crate::config::AppConfig;
use std::{
    env, fs,
    io::Write,
    panic,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, OnceLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 256 * 1024;
static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_WRITER: OnceLock<Mutex<Option<LogWriter>>> = OnceLock::new();

pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("ulterm.log")
}

/// Crash log; panic payloads are omitted unless content logging is on.
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("ulterm_crash.log")
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

struct LogWriter {
    path: PathBuf,
    file: fs::File,
    max_bytes: u64,
    bytes_written: u64,
}

impl LogWriter {
    fn open(path: PathBuf, max_bytes: u64) -> Option<Self> {
        let mut bytes_written = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if bytes_written > max_bytes {
            let _ = fs::remove_file(&path);
            bytes_written = 0;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;
        Some(Self {
            path,
            file,
            max_bytes,
            bytes_written,
        })
    }

    fn write_line(&mut self, line: &str) {
        if self.bytes_written.saturating_add(line.len() as u64) > self.max_bytes {
            if let Ok(file) = fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
            {
                self.file = file;
                self.bytes_written = 0;
            }
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.bytes_written = self.bytes_written.saturating_add(line.len() as u64);
        }
    }
}

fn log_writer() -> &'static Mutex<Option<LogWriter>> {
    LOG_WRITER.get_or_init(|| Mutex::new(None))
}

fn configure(enabled: bool, content_enabled: bool) {
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
    LOG_CONTENT_ENABLED.store(enabled && content_enabled, Ordering::Relaxed);
    let mut writer = log_writer()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *writer = if enabled {
        LogWriter::open(log_file_path(), LOG_MAX_BYTES)
    } else {
        None
    };
}

/// Configure logging from CLI flags or environment.
pub fn init_logging(config: &AppConfig) {
    configure(config.logging_enabled(), config.log_content);
}

/// Debug line for troubleshooting without drawing over the TUI.
pub fn log_debug(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let line = format!("[{}] {msg}\n", unix_seconds());
    let mut writer = log_writer()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(writer) = writer.as_mut() {
        writer.write_line(&line);
    }
}

/// Log a line that carries device output or operator input.
pub fn log_debug_content(msg: &str) {
    if !LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    log_debug(msg);
}

pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let payload = if LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        if let Some(text) = info.payload().downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = info.payload().downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        }
    } else {
        "panic payload omitted (log-content disabled)".to_string()
    };
    let line = format!(
        "[{}] panic at {location}: {payload} (v{})\n",
        unix_seconds(),
        env!("CARGO_PKG_VERSION")
    );
    if let Some(mut writer) = LogWriter::open(crash_log_path(), CRASH_LOG_MAX_BYTES) {
        writer.write_line(&line);
    }
}

#[cfg(test)]
pub(crate) fn set_logging_for_tests(enabled: bool, content_enabled: bool) {
    configure(enabled, content_enabled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static LOG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn new_log_text(f: impl FnOnce()) -> String {
        let before = fs::read(log_file_path()).unwrap_or_default();
        f();
        let after = fs::read(log_file_path()).unwrap_or_default();
        String::from_utf8_lossy(after.get(before.len()..).unwrap_or(&[])).into_owned()
    }

    #[test]
    fn content_lines_need_content_flag() {
        let _guard = LOG_TEST_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        set_logging_for_tests(true, false);
        let text = new_log_text(|| {
            log_debug("lifecycle marker 7f3a");
            log_debug_content("device text 7f3a");
        });
        set_logging_for_tests(false, false);
        assert!(text.contains("lifecycle marker 7f3a"));
        assert!(!text.contains("device text 7f3a"));
    }

    #[test]
    fn disabled_logging_writes_nothing() {
        let _guard = LOG_TEST_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        set_logging_for_tests(false, true);
        let text = new_log_text(|| log_debug("silent marker 91bc"));
        assert!(!text.contains("silent marker 91bc"));
    }

    #[test]
    fn writer_truncates_when_cap_is_reached() {
        let path = env::temp_dir().join(format!("ulterm_cap_test_{}.log", std::process::id()));
        let _ = fs::remove_file(&path);
        let mut writer = LogWriter::open(path.clone(), 16).expect("open log");
        writer.write_line("0123456789\n");
        writer.write_line("abcdefghij\n");
        let text = fs::read_to_string(&path).expect("read log");
        let _ = fs::remove_file(&path);
        assert_eq!(text, "abcdefghij\n");
    }
}
