//! Error taxonomy and per-exchange collection.
//!
//! Every problem encountered while building a snapshot is recorded as an
//! [`ErrorRecord`] and attached to the outgoing payload. Records never alter
//! the instrumented exchange; severity is derived from the kind and cannot be
//! set by callers.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::panic::Location;
use std::sync::Mutex;

/// Category of a recorded error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    UnhandledException,
    RequestError,
    ResponseError,
    RuntimeError,
    SystemError,
    FrameworkError,
    ValidationError,
    DatabaseError,
    UserError,
    UserWarning,
}

/// Criticality label, a pure function of [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorKind {
    /// Fixed severity for this kind.
    pub fn severity(self) -> Severity {
        match self {
            Self::UnhandledException | Self::SystemError | Self::DatabaseError => {
                Severity::Critical
            }
            Self::RuntimeError | Self::FrameworkError => Severity::High,
            Self::RequestError | Self::ResponseError | Self::UserError => Severity::Medium,
            Self::ValidationError | Self::UserWarning => Severity::Low,
        }
    }
}

/// A single structured error observation.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub source: String,
    pub file: String,
    pub line: u32,
    pub severity: Severity,
    /// Optional structured context carried alongside the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub timestamp: String,
}

impl ErrorRecord {
    /// Build a record at the caller's source location.
    #[track_caller]
    pub fn new(message: impl Into<String>, kind: ErrorKind, source: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            message: message.into(),
            kind,
            source: source.into(),
            file: location.file().to_string(),
            line: location.line(),
            severity: kind.severity(),
            context: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Attach structured context.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Thread-safe, ordered accumulator of [`ErrorRecord`]s for one exchange.
///
/// Created when an exchange starts; its contents are drained into the response
/// snapshot before disposal.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error message under the caller's source location.
    #[track_caller]
    pub fn add(&self, message: impl Into<String>, kind: ErrorKind, source: impl Into<String>) {
        self.push(ErrorRecord::new(message, kind, source));
    }

    /// Record an error message with structured context.
    #[track_caller]
    pub fn add_with_context(
        &self,
        message: impl Into<String>,
        kind: ErrorKind,
        source: impl Into<String>,
        context: Value,
    ) {
        self.push(ErrorRecord::new(message, kind, source).with_context(context));
    }

    /// Append a prebuilt record.
    pub fn push(&self, record: ErrorRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    /// Copy of all records collected so far, in insertion order.
    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Take all records, leaving the collector empty.
    pub fn drain(&self) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .map(|mut records| std::mem::take(&mut *records))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
