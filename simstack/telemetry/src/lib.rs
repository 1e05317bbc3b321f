#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSONL logging and run-level metrics snapshots shared across the
//! SimStack engines.

use std::{
    fmt,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Log severity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator.
    Warn,
    /// Error indicator.
    Error,
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Component emitting the log.
    pub component: String,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary JSON payload for context fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(component: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            component: component.into(),
            level,
            message: message.into(),
            fields: serde_json::Map::new(),
        }
    }
}

/// Thread-safe append-only JSON-lines logger with a severity floor.
#[derive(Debug)]
pub struct JsonlLogger {
    path: PathBuf,
    min_level: LogLevel,
    writer: Mutex<File>,
}

impl JsonlLogger {
    /// Creates or opens a logger at the desired path.
    pub fn new(path: impl AsRef<Path>, min_level: LogLevel) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            min_level,
            writer: Mutex::new(file),
        })
    }

    /// Writes a log record as a JSON line. Records below the severity floor
    /// are discarded.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        if record.level < self.min_level {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Returns the underlying file path (useful for tests).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Telemetry builder scoped to one component label.
pub struct TelemetryBuilder {
    component: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
}

impl TelemetryBuilder {
    /// Creates a new builder for the given component.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            log_path: None,
            min_level: LogLevel::Info,
        }
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets the severity floor (defaults to `Info`).
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<Telemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonlLogger::new(path, self.min_level)?),
            None => None,
        };
        Ok(Telemetry {
            inner: Arc::new(TelemetryInner {
                component: self.component,
                logger,
            }),
        })
    }
}

/// Cloneable telemetry handle shared across engine components.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<TelemetryInner>,
}

struct TelemetryInner {
    component: String,
    logger: Option<JsonlLogger>,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("component", &self.inner.component)
            .finish()
    }
}

impl Telemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(component: impl Into<String>) -> TelemetryBuilder {
        TelemetryBuilder::new(component)
    }

    /// Logs a message with JSON context fields.
    pub fn log(&self, level: LogLevel, message: &str, fields: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let mut record = LogRecord::new(&self.inner.component, level, message);
            if let Some(obj) = fields.as_object() {
                record.fields = obj.clone();
            }
            logger.log(&record)?;
        }
        Ok(())
    }
}

/// Run-level performance snapshot. All fields stay zero until the first run
/// publishes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    /// Planning phase latency in milliseconds.
    pub planner_ms: u64,
    /// Simulation dispatch phase latency in milliseconds.
    pub simulation_ms: u64,
    /// Inference throughput of the most recent sampled call.
    pub tokens_per_second: f64,
}

/// Process-wide holder for the latest [`MetricsSnapshot`].
///
/// The orchestration engine is the single writer; it replaces the whole
/// snapshot atomically per phase. Readers clone the current `Arc` without
/// blocking the writer for longer than the pointer swap.
#[derive(Debug, Clone, Default)]
pub struct MetricsHub {
    current: Arc<RwLock<Arc<MetricsSnapshot>>>,
}

impl MetricsHub {
    /// Creates a hub seeded with a zeroed snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the published snapshot.
    pub fn publish(&self, snapshot: MetricsSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }

    /// Returns the most recently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<MetricsSnapshot> {
        Arc::clone(&self.current.read())
    }
}
