//! High-level pipeline: manifest -> worker pool -> oneprovider -> record logs.
//!
//! A single producer streams manifest lines into a handoff queue; a fixed pool
//! of workers takes lines off the queue, resolves each one, runs the
//! lookup/write/verify exchange through [`sync_entry`] and routes the outcome to
//! the confirmation or failure sink.
//!
//! # Responsibilities
//! - Each line is received by exactly one worker.
//! - Worker `i` talks to `endpoints[i % endpoints.len()]` for its whole life.
//! - Once every worker has returned, both sinks are drained (polling their queue
//!   depth) and closed before [`Pipeline::synchronise`] returns.
//!
//! # Error Handling
//! Only a manifest that cannot be opened, a sink that fails to flush, or a
//! crashed producer abort the run. Per-entry failures are written to the failure
//! sink and counted in the [`SynchroniseReport`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SyncConfig;
use crate::contract::{RecordSink, XattrApi};
use crate::engine::{sync_entry, ChecksumCheck, FailureRecord};
use crate::error::{Result, SyncError};
use crate::oneprovider::{build_http_client, OneproviderClient};
use crate::resolve::PathResolver;
use crate::retry::RetryPolicy;

/// Outcome counts for a full run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SynchroniseReport {
    pub lines_read: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub malformed: usize,
}

/// Per-worker outcome counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub confirmed: usize,
    pub failed: usize,
    pub malformed: usize,
}

impl SynchroniseReport {
    fn add(&mut self, stats: WorkerStats) {
        self.confirmed += stats.confirmed;
        self.failed += stats.failed;
        self.malformed += stats.malformed;
    }

    /// Lines that were received by a worker and ran to an outcome.
    pub fn processed(&self) -> usize {
        self.confirmed + self.failed + self.malformed
    }
}

type WorkQueue = Arc<Mutex<mpsc::Receiver<Vec<u8>>>>;

struct WorkerContext {
    resolver: PathResolver,
    retry: RetryPolicy,
    checksum_check: ChecksumCheck,
    confirmations: Arc<dyn RecordSink>,
    failures: Arc<dyn RecordSink>,
}

pub struct Pipeline {
    pub resolver: PathResolver,
    /// One client per endpoint.
    pub endpoints: Vec<Arc<dyn XattrApi>>,
    pub confirmations: Arc<dyn RecordSink>,
    pub failures: Arc<dyn RecordSink>,
    pub workers: usize,
    pub retry: RetryPolicy,
    pub checksum_check: ChecksumCheck,
    pub drain_interval: Duration,
}

impl Pipeline {
    /// Wires oneprovider clients for every configured endpoint. All clients
    /// share one HTTP connection pool.
    pub fn from_config(
        config: &SyncConfig,
        token: &str,
        confirmations: Arc<dyn RecordSink>,
        failures: Arc<dyn RecordSink>,
    ) -> Result<Self> {
        let buckets = config.bucket_table();
        if buckets.is_empty() {
            return Err(SyncError::Config("bucket table is empty".into()));
        }

        let http = build_http_client(config.workers, config.connect_timeout())
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        let endpoints = config
            .endpoints
            .iter()
            .map(|url| {
                Arc::new(OneproviderClient::new(
                    http.clone(),
                    url.as_str(),
                    token,
                    config.request_timeout(),
                )) as Arc<dyn XattrApi>
            })
            .collect();

        info!(
            endpoints = config.endpoints.len(),
            buckets = buckets.len(),
            "Pipeline configured"
        );

        Ok(Self {
            resolver: PathResolver::new(Arc::new(buckets)),
            endpoints,
            confirmations,
            failures,
            workers: config.workers,
            retry: config.retry_policy(),
            checksum_check: config.checksum_check,
            drain_interval: config.drain_interval(),
        })
    }

    /// Runs the whole manifest at `manifest`. Failing to open the file is fatal
    /// and happens before any worker starts.
    pub async fn synchronise(&self, manifest: &Path) -> Result<SynchroniseReport> {
        let file = tokio::fs::File::open(manifest).await.map_err(|source| {
            error!(path = %manifest.display(), error = %source, "Failed to open manifest");
            SyncError::ManifestOpen {
                path: manifest.display().to_string(),
                source,
            }
        })?;
        info!(path = %manifest.display(), "Opened manifest");
        self.synchronise_reader(BufReader::new(file)).await
    }

    /// Runs every line produced by `reader`.
    pub async fn synchronise_reader<R>(&self, reader: R) -> Result<SynchroniseReport>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        if self.endpoints.is_empty() {
            return Err(SyncError::Config("no endpoints configured".into()));
        }
        let workers = self.workers.max(1);

        info!(
            workers,
            endpoints = self.endpoints.len(),
            "Starting synchronisation pipeline"
        );

        // Capacity 1 is the closest tokio offers to an unbuffered handoff.
        let (tx, rx) = mpsc::channel::<Vec<u8>>(1);
        let queue: WorkQueue = Arc::new(Mutex::new(rx));
        let producer = tokio::spawn(produce(reader, tx));

        let ctx = Arc::new(WorkerContext {
            resolver: self.resolver.clone(),
            retry: self.retry.clone(),
            checksum_check: self.checksum_check,
            confirmations: self.confirmations.clone(),
            failures: self.failures.clone(),
        });

        let handles: Vec<_> = (0..workers)
            .map(|index| {
                let api = self.endpoints[index % self.endpoints.len()].clone();
                tokio::spawn(consume(index, queue.clone(), api, ctx.clone()))
            })
            .collect();

        let mut report = SynchroniseReport::default();
        for (index, result) in join_all(handles).await.into_iter().enumerate() {
            match result {
                Ok(stats) => report.add(stats),
                Err(e) => error!(worker = index, error = %e, "Worker task failed"),
            }
        }

        report.lines_read = producer.await.map_err(|e| {
            error!(error = %e, "Manifest producer failed");
            SyncError::Task(format!("manifest producer: {e}"))
        })?;

        let confirmations = drain_and_close(self.confirmations.as_ref(), self.drain_interval).await;
        let failures = drain_and_close(self.failures.as_ref(), self.drain_interval).await;
        confirmations.and(failures)?;

        info!(
            lines = report.lines_read,
            confirmed = report.confirmed,
            failed = report.failed,
            malformed = report.malformed,
            "Synchronisation finished"
        );
        Ok(report)
    }
}

/// Pushes raw manifest lines into the queue in file order. Lines are passed
/// on as bytes; UTF-8 validation happens in the worker so that a bad line is
/// reported instead of ending the run. Dropping `tx` at the end closes the
/// queue.
async fn produce<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut count = 0;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                count += 1;
                if tx.send(strip_line_ending(&buf).to_vec()).await.is_err() {
                    warn!(line = count, "All workers stopped, manifest not fully queued");
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, after_line = count, "Failed to read manifest, stopping producer");
                break;
            }
        }
    }
    info!(lines = count, "Manifest fully queued");
    count
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

async fn consume(
    index: usize,
    queue: WorkQueue,
    api: Arc<dyn XattrApi>,
    ctx: Arc<WorkerContext>,
) -> WorkerStats {
    let span = info_span!("worker", index, endpoint = %api.endpoint());
    async move {
        let mut stats = WorkerStats::default();
        loop {
            let next = queue.lock().await.recv().await;
            let Some(raw) = next else {
                break;
            };

            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    let line = String::from_utf8_lossy(e.as_bytes()).into_owned();
                    let err = SyncError::malformed(&line, "line is not valid UTF-8");
                    warn!(error = %err, "Skipping manifest entry");
                    ctx.failures.enqueue(FailureRecord::new(&line, &err).to_string());
                    stats.malformed += 1;
                    continue;
                }
            };

            let resource = match ctx.resolver.resolve_line(&line) {
                Ok(resource) => resource,
                Err(e) => {
                    warn!(error = %e, "Skipping manifest entry");
                    ctx.failures.enqueue(FailureRecord::new(&line, &e).to_string());
                    stats.malformed += 1;
                    continue;
                }
            };

            match sync_entry(api.as_ref(), &resource, &ctx.retry, ctx.checksum_check).await {
                Ok(record) => {
                    debug!(path = %resource.encoded_path, "Entry confirmed");
                    ctx.confirmations.enqueue(record.to_string());
                    stats.confirmed += 1;
                }
                Err(e) => {
                    error!(path = %resource.encoded_path, error = %e, "Entry failed");
                    ctx.failures.enqueue(FailureRecord::new(&line, &e).to_string());
                    stats.failed += 1;
                }
            }
        }
        debug!(?stats, "Worker finished");
        stats
    }
    .instrument(span)
    .await
}

/// Waits until `sink` has written everything queued, then closes it.
pub async fn drain_and_close(sink: &dyn RecordSink, interval: Duration) -> Result<()> {
    while sink.queue_depth() > 0 {
        tokio::time::sleep(interval).await;
    }
    sink.close().await
}
