//! Record sinks: where confirmation and failure records end up.
//!
//! [`RotatingFileSink`] hands records to a dedicated blocking writer over an
//! unbounded channel, so workers never wait on disk I/O. The writer appends to a
//! `tracing_appender` rolling file. [`MemorySink`] keeps records in memory.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::contract::RecordSink;
use crate::error::{Result, SyncError};

/// How often a record log starts a new file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Minutely,
    Hourly,
    #[default]
    Daily,
}

impl From<LogRotation> for Rotation {
    fn from(r: LogRotation) -> Self {
        match r {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        }
    }
}

/// Location and rotation of one record log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLogConfig {
    pub dir: PathBuf,
    pub prefix: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default)]
    pub rotation: LogRotation,
}

fn default_suffix() -> String {
    "txt".to_string()
}

impl RecordLogConfig {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            suffix: default_suffix(),
            rotation: LogRotation::default(),
        }
    }
}

/// Asynchronous sink writing one record per line to a rolling file.
pub struct RotatingFileSink {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    writer: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    depth: Arc<AtomicUsize>,
}

impl RotatingFileSink {
    /// Creates the log directory and starts the writer task. Must be called
    /// from within a tokio runtime.
    pub fn open(config: &RecordLogConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.dir).map_err(|e| {
            SyncError::Sink(format!(
                "failed to create log directory {}: {e}",
                config.dir.display()
            ))
        })?;

        let appender = RollingFileAppender::builder()
            .rotation(config.rotation.into())
            .filename_prefix(&config.prefix)
            .filename_suffix(&config.suffix)
            .build(&config.dir)
            .map_err(|e| SyncError::Sink(format!("failed to open record log: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let writer = tokio::task::spawn_blocking({
            let depth = depth.clone();
            move || write_records(appender, rx, depth)
        });

        info!(
            dir = %config.dir.display(),
            prefix = %config.prefix,
            rotation = ?config.rotation,
            "Opened record log"
        );

        Ok(Self {
            name: config.prefix.clone(),
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            depth,
        })
    }
}

fn write_records(
    mut appender: RollingFileAppender,
    mut rx: mpsc::UnboundedReceiver<String>,
    depth: Arc<AtomicUsize>,
) -> std::io::Result<()> {
    while let Some(record) = rx.blocking_recv() {
        let written = writeln!(appender, "{record}");
        depth.fetch_sub(1, Ordering::SeqCst);
        if let Err(e) = written {
            error!(error = %e, "Failed to write record, discarding the rest of the queue");
            discard_pending(&mut rx, &depth);
            return Err(e);
        }
    }
    appender.flush()
}

/// Closes the channel and empties it, so the queue depth reaches zero and
/// later enqueues fail fast.
fn discard_pending(rx: &mut mpsc::UnboundedReceiver<String>, depth: &AtomicUsize) {
    rx.close();
    let mut dropped = 0usize;
    while rx.blocking_recv().is_some() {
        depth.fetch_sub(1, Ordering::SeqCst);
        dropped += 1;
    }
    if dropped > 0 {
        error!(dropped, "Records discarded after write failure");
    }
}

#[async_trait]
impl RecordSink for RotatingFileSink {
    fn enqueue(&self, record: String) {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => {
                self.depth.fetch_add(1, Ordering::SeqCst);
                if tx.send(record).is_err() {
                    self.depth.fetch_sub(1, Ordering::SeqCst);
                    error!(sink = %self.name, "Record writer stopped, record dropped");
                }
            }
            None => error!(sink = %self.name, record = %record, "Record enqueued after close"),
        }
    }

    fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        // Dropping the sender ends the writer loop once the queue is empty.
        drop(self.tx.lock().unwrap_or_else(|e| e.into_inner()).take());

        let writer = self.writer.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(writer) = writer else {
            return Ok(());
        };

        match writer.await {
            Ok(Ok(())) => {
                debug!(sink = %self.name, "Record log flushed and closed");
                Ok(())
            }
            Ok(Err(e)) => Err(SyncError::Sink(format!("{}: {e}", self.name))),
            Err(e) => Err(SyncError::Sink(format!("{} writer task failed: {e}", self.name))),
        }
    }
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<String>>,
    closed: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<String> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    fn enqueue(&self, record: String) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    fn queue_depth(&self) -> usize {
        0
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read_all(dir: &std::path::Path) -> String {
        let mut out = String::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            out.push_str(&std::fs::read_to_string(entry.unwrap().path()).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn close_flushes_every_enqueued_record() {
        let dir = tempdir().unwrap();
        let mut config = RecordLogConfig::new(dir.path(), "confirmed");
        config.rotation = LogRotation::Never;

        let sink = RotatingFileSink::open(&config).expect("sink should open");
        for i in 0..500 {
            sink.enqueue(format!("checksum{i}  dir/file{i}"));
        }
        sink.close().await.expect("close should flush");

        assert_eq!(sink.queue_depth(), 0);
        let contents = read_all(dir.path());
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 500);
        assert_eq!(lines[0], "checksum0  dir/file0");
        assert_eq!(lines[499], "checksum499  dir/file499");
        assert!(dir.path().join("confirmed.txt").exists());
    }

    #[tokio::test]
    async fn queue_depth_drains_to_zero() {
        let dir = tempdir().unwrap();
        let sink = RotatingFileSink::open(&RecordLogConfig::new(dir.path(), "drain")).unwrap();
        for i in 0..50 {
            sink.enqueue(format!("line {i}"));
        }
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while sink.queue_depth() > 0 {
            assert!(tokio::time::Instant::now() < deadline, "queue never drained");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let sink = RotatingFileSink::open(&RecordLogConfig::new(dir.path(), "twice")).unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();
        sink.enqueue("late".to_string());
        assert_eq!(sink.queue_depth(), 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn write_failure_empties_queue_and_fails_close() {
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink("/dev/full", dir.path().join("full.txt")).unwrap();
        let mut config = RecordLogConfig::new(dir.path(), "full");
        config.rotation = LogRotation::Never;

        let sink = RotatingFileSink::open(&config).unwrap();
        for i in 0..1000 {
            sink.enqueue(format!("record {i}"));
        }

        let drained = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            crate::synchronise::drain_and_close(&sink, std::time::Duration::from_millis(5)),
        )
        .await
        .expect("drain must not hang after a write failure");

        assert!(matches!(drained, Err(SyncError::Sink(_))), "got {drained:?}");
        assert_eq!(sink.queue_depth(), 0);
    }

    #[tokio::test]
    async fn memory_sink_keeps_records() {
        let sink = MemorySink::new();
        sink.enqueue("a".into());
        sink.enqueue("b".into());
        sink.close().await.unwrap();
        assert_eq!(sink.records(), vec!["a", "b"]);
        assert!(sink.is_closed());
    }
}
