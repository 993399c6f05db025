//! # contract: seams between the pipeline and the outside world
//!
//! This module defines the two traits the pipeline is written against:
//!
//! - [`XattrApi`]: the three remote operations (lookup, write, read back) for a
//!   single oneprovider endpoint. Implemented by [`crate::oneprovider::OneproviderClient`]
//!   and by test fakes.
//! - [`RecordSink`]: an asynchronous, append-only record log with observable queue
//!   depth and an explicit flushing close. Implemented by
//!   [`crate::sink::RotatingFileSink`] and [`crate::sink::MemorySink`].
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`; the generated `MockXattrApi` and
//!   `MockRecordSink` are exported with the `test-export-mocks` feature.

use std::fmt;

use async_trait::async_trait;
use mockall::automock;

use crate::error::PhaseError;

/// Opaque handle the remote API uses to address an object after path lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId(pub String);

impl FileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote extended-attribute operations against one endpoint.
///
/// Every call is a single attempt: implementors must not retry internally, the
/// engine applies [`crate::retry::RetryPolicy`] around each call.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait XattrApi: Send + Sync {
    /// Base URL of the endpoint, for diagnostics.
    fn endpoint(&self) -> String;

    /// Phase 1: resolve an encoded path into a file identifier.
    async fn lookup_file_id(&self, encoded_path: &str) -> Result<FileId, PhaseError>;

    /// Phase 2: store `checksum` under the md5 metadata key.
    async fn write_checksum(&self, file_id: &FileId, checksum: &str) -> Result<(), PhaseError>;

    /// Phase 3: read the md5 metadata key back.
    async fn read_checksum(&self, file_id: &FileId) -> Result<String, PhaseError>;
}

/// Append-only record log fed by many concurrent workers.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Queue one record. Never waits for the record to be written.
    fn enqueue(&self, record: String);

    /// Number of records queued but not yet written.
    fn queue_depth(&self) -> usize;

    /// Stop accepting records and return once everything queued is durable.
    async fn close(&self) -> crate::error::Result<()>;
}
