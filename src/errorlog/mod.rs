//! Error-log collaborator: persists individual error fields as plain text.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tracing::warn;

/// Receives every individual error field from the stream demultiplexer,
/// one write per field per record, plus launch-failure summaries. The sink
/// decides its own persistence semantics; it must never take the engine down.
pub trait ErrorSink: Send + Sync {
    fn write_field(&self, text: &str);
    fn write_summary(&self, text: &str);
}

/// Appends lines to a log file. The file only ever holds the current
/// session's errors; it is truncated when the sink is constructed.
pub struct FileErrorLog {
    path: PathBuf,
}

impl FileErrorLog {
    pub fn create(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = fs::write(&path, "") {
            warn!(path = %path.display(), error = %e, "cannot reset error log");
        }
        Self { path }
    }

    fn append(&self, text: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{text}"));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "error log write failed");
        }
    }
}

impl ErrorSink for FileErrorLog {
    fn write_field(&self, text: &str) {
        self.append(text);
    }

    fn write_summary(&self, text: &str) {
        self.append(text);
    }
}

/// Sink for embedders that do not want error persistence.
pub struct NullErrorLog;

impl ErrorSink for NullErrorLog {
    fn write_field(&self, _text: &str) {}
    fn write_summary(&self, _text: &str) {}
}
