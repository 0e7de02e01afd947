//! Append-only textual event log (spec §4.5).
//!
//! Distinct from the ambient `tracing` diagnostics emitted elsewhere in this
//! binary: this is the specified, fixed-format log the dashboard's
//! semantics are defined against.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

pub struct Logger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Logger {
    /// Truncates `path` and writes the startup banner. File-open failure at
    /// startup is not swallowed (it is surfaced via `io::Result`) since a
    /// logger that can't even open its file at boot is a real misconfiguration;
    /// subsequent per-line open failures (`log`) are swallowed per spec §4.5.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::create(&path)?;
        writeln!(file, "--- Log Started: {} ---", Local::now())?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Prints one line to stdout and appends it to the log file. Appending
    /// failures are swallowed; only the lock itself cannot fail.
    pub fn log(&self, client_ip: &str, method: &str, url: &str, status: u16, result: &str) {
        let timestamp = Local::now().format("%H:%M:%S");
        let line = format!("[{timestamp}] {client_ip} | {method:<7} | {status} | {result:<15} | {url}");

        let _guard = self.lock.lock().unwrap();
        println!("{line}");
        if let Ok(mut file) = OpenOptions::new().append(true).open(&self.path) {
            let _ = writeln!(file, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("relay-proxy-logger-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn truncates_and_writes_banner() {
        let path = temp_path("banner");
        let logger = Logger::new(&path).unwrap();
        logger.log("1.2.3.4", "GET", "http://example.test/", 200, "CACHE_MISS");

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("--- Log Started:"));
        assert!(contents.contains("1.2.3.4"));
        assert!(contents.contains("CACHE_MISS"));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn line_has_padded_fixed_width_fields() {
        let path = temp_path("padding");
        let logger = Logger::new(&path).unwrap();
        logger.log("1.2.3.4", "GET", "http://x/", 200, "CACHE_MISS");

        let contents = fs::read_to_string(&path).unwrap();
        let line = contents.lines().nth(1).unwrap();
        assert!(line.contains("GET     |"));
        assert!(line.contains("| CACHE_MISS      |"));
        fs::remove_file(&path).ok();
    }
}
