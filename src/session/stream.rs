//! Demultiplexes interpreter output into structured, UI-consumable state.
//!
//! Three channels feed in: stdout lines, error records, progress records.
//! Within one channel, delivery order follows emission order; nothing is
//! guaranteed across channels.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::errorlog::ErrorSink;

pub const ERROR_SEPARATOR: &str = "=======================================================";
const LINE_END: &str = "\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomKind {
    Output,
    Error,
}

/// One record produced during a run, delivered in channel order while the
/// session is running. Not retained by the engine past session reset.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputRecord {
    /// A line the script explicitly marked as user-facing.
    Custom { text: String, kind: CustomKind },
    /// An unmarked output line, also appended to the raw buffer.
    Raw(String),
    /// Latest progress sample; no history is kept.
    Progress { percent: u8, operation: String },
    /// Full error record, diagnostic-only apart from the exception text.
    ErrorDetail(ErrorFields),
}

/// The eight independently-optional fields of one error record, as decoded
/// from the interpreter's stderr wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ErrorFields {
    pub target_object: Option<String>,
    pub category_info: Option<String>,
    pub stack_trace: Option<String>,
    pub fully_qualified_id: Option<String>,
    pub details: Option<String>,
    pub exception: Option<String>,
    pub invocation_info: Option<String>,
    pub pipeline_iteration_info: Option<String>,
}

impl ErrorFields {
    /// Present fields in their fixed merge order.
    fn present(&self) -> impl Iterator<Item = &str> {
        [
            &self.target_object,
            &self.category_info,
            &self.stack_trace,
            &self.fully_qualified_id,
            &self.details,
            &self.exception,
            &self.invocation_info,
            &self.pipeline_iteration_info,
        ]
        .into_iter()
        .filter_map(|f| f.as_deref())
    }
}

/// Accumulated observable state for one run. Mutated only by the session's
/// background task and by the controller's reset path, never both at once;
/// reset is gated on the state machine being idle.
#[derive(Debug, Default)]
pub struct StreamBuffers {
    pub output_raw: String,
    pub error_raw: String,
    pub custom: Vec<(String, CustomKind)>,
    pub progress_percent: u8,
    pub progress_operation: String,
    /// Last-seen exception text, kept as the run's terminal error value.
    pub last_error_exception: String,
}

impl StreamBuffers {
    pub fn contains_data(&self) -> bool {
        !self.output_raw.is_empty()
            || !self.custom.is_empty()
            || self.progress_percent != 0
            || !self.progress_operation.is_empty()
            || !self.error_raw.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

pub type SharedBuffers = Arc<Mutex<StreamBuffers>>;

pub struct StreamDemux {
    custom_prefix: String,
    buffers: SharedBuffers,
    records: UnboundedSender<OutputRecord>,
    error_log: Arc<dyn ErrorSink>,
}

impl StreamDemux {
    pub fn new(
        custom_prefix: String,
        buffers: SharedBuffers,
        records: UnboundedSender<OutputRecord>,
        error_log: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            custom_prefix,
            buffers,
            records,
            error_log,
        }
    }

    /// Routes one stdout line: marker-prefixed lines become custom output,
    /// everything else goes to the raw buffer with a line terminator.
    pub fn on_stdout_line(&self, line: &str) {
        // Lines shorter than the marker must fall through to raw; the
        // length check keeps the slice in bounds.
        if !self.custom_prefix.is_empty() && line.len() >= self.custom_prefix.len() {
            if let Some(rest) = line.strip_prefix(&self.custom_prefix) {
                self.emit_custom(rest.to_string(), CustomKind::Output);
                return;
            }
        }
        {
            let mut buffers = self.buffers.lock();
            buffers.output_raw.push_str(line);
            buffers.output_raw.push_str(LINE_END);
        }
        let _ = self.records.send(OutputRecord::Raw(line.to_string()));
    }

    /// Merges one error record: every present field is appended to the
    /// cumulative error buffer and forwarded to the error log individually,
    /// with one separator line per record. The exception text is the only
    /// sub-field also surfaced as custom output.
    pub fn on_error_record(&self, fields: ErrorFields) {
        if let Some(message) = fields.exception.clone() {
            self.emit_custom(message, CustomKind::Error);
        }
        {
            let mut buffers = self.buffers.lock();
            for field in fields.present() {
                buffers.error_raw.push_str(field);
                buffers.error_raw.push_str(LINE_END);
            }
            buffers.error_raw.push_str(ERROR_SEPARATOR);
            buffers.error_raw.push_str(LINE_END);
            if let Some(message) = &fields.exception {
                buffers.last_error_exception = message.clone();
            }
        }
        for field in fields.present() {
            self.error_log.write_field(field);
        }
        let _ = self.records.send(OutputRecord::ErrorDetail(fields));
    }

    /// Republishes the latest progress sample; out-of-range percentages are
    /// clamped to 0..=100.
    pub fn on_progress_record(&self, percent: i64, operation: &str) {
        let percent = percent.clamp(0, 100) as u8;
        {
            let mut buffers = self.buffers.lock();
            buffers.progress_percent = percent;
            buffers.progress_operation = operation.to_string();
        }
        let _ = self.records.send(OutputRecord::Progress {
            percent,
            operation: operation.to_string(),
        });
    }

    fn emit_custom(&self, text: String, kind: CustomKind) {
        self.buffers.lock().custom.push((text.clone(), kind));
        let _ = self.records.send(OutputRecord::Custom { text, kind });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct CollectingSink(Mutex<Vec<String>>);

    impl ErrorSink for CollectingSink {
        fn write_field(&self, text: &str) {
            self.0.lock().push(text.to_string());
        }
        fn write_summary(&self, text: &str) {
            self.0.lock().push(format!("summary: {text}"));
        }
    }

    fn demux() -> (
        StreamDemux,
        SharedBuffers,
        mpsc::UnboundedReceiver<OutputRecord>,
        Arc<CollectingSink>,
    ) {
        let buffers: SharedBuffers = Arc::new(Mutex::new(StreamBuffers::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));
        let demux = StreamDemux::new(
            "#!".into(),
            Arc::clone(&buffers),
            tx,
            Arc::clone(&sink) as Arc<dyn ErrorSink>,
        );
        (demux, buffers, rx, sink)
    }

    #[test]
    fn raw_lines_accumulate_with_crlf() {
        let (demux, buffers, mut rx, _) = demux();
        demux.on_stdout_line("Hello Alice");
        assert_eq!(buffers.lock().output_raw, "Hello Alice\r\n");
        assert_eq!(rx.try_recv().unwrap(), OutputRecord::Raw("Hello Alice".into()));
    }

    #[test]
    fn marker_lines_become_custom_output() {
        let (demux, buffers, mut rx, _) = demux();
        demux.on_stdout_line("#!done with phase one");
        assert!(buffers.lock().output_raw.is_empty());
        assert_eq!(
            rx.try_recv().unwrap(),
            OutputRecord::Custom {
                text: "done with phase one".into(),
                kind: CustomKind::Output,
            }
        );
    }

    #[test]
    fn line_shorter_than_marker_goes_to_raw() {
        let (demux, buffers, _rx, _) = demux();
        demux.on_stdout_line("#");
        assert_eq!(buffers.lock().output_raw, "#\r\n");
    }

    #[test]
    fn error_record_merges_fields_and_forwards_each() {
        let (demux, buffers, mut rx, sink) = demux();
        demux.on_error_record(ErrorFields {
            target_object: Some("Get-Thing".into()),
            exception: Some("thing not found".into()),
            ..Default::default()
        });

        let b = buffers.lock();
        assert_eq!(
            b.error_raw,
            format!("Get-Thing\r\nthing not found\r\n{ERROR_SEPARATOR}\r\n")
        );
        assert_eq!(b.last_error_exception, "thing not found");
        drop(b);

        assert_eq!(*sink.0.lock(), vec!["Get-Thing", "thing not found"]);

        // The exception surfaces as a custom error record first.
        assert_eq!(
            rx.try_recv().unwrap(),
            OutputRecord::Custom {
                text: "thing not found".into(),
                kind: CustomKind::Error,
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), OutputRecord::ErrorDetail(_)));
    }

    #[test]
    fn progress_keeps_latest_sample_only() {
        let (demux, buffers, _rx, _) = demux();
        demux.on_progress_record(30, "copying");
        demux.on_progress_record(250, "finalizing");

        let b = buffers.lock();
        assert_eq!(b.progress_percent, 100);
        assert_eq!(b.progress_operation, "finalizing");
    }

    #[test]
    fn contains_data_tracks_every_stream() {
        let (demux, buffers, _rx, _) = demux();
        assert!(!buffers.lock().contains_data());
        demux.on_progress_record(10, "");
        assert!(buffers.lock().contains_data());
        buffers.lock().clear();
        assert!(!buffers.lock().contains_data());
    }
}
