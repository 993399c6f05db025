//! Manifest line parsing and resolution of local paths into oneprovider paths.
//!
//! A manifest line looks like `<checksum>  <path>` (two spaces). The path is
//! split on `/`; the segment at [`BUCKET_KEY_INDEX`] names a logical storage
//! location which [`BucketTable`] maps to the canonical bucket (space) name used
//! by the remote system.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, SyncError};

/// Position of the bucket key among the `/`-separated path segments.
pub const BUCKET_KEY_INDEX: usize = 3;

/// Minimum number of path segments: the bucket key plus at least one segment after it.
pub const MIN_SEGMENTS: usize = 5;

const SEPARATOR: &str = "  ";

/// One line of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub checksum: String,
    pub path: String,
}

impl ManifestEntry {
    /// Parses `<checksum>  <path>`. The path is everything after the two
    /// separating spaces and may itself contain single spaces.
    pub fn parse(line: &str) -> Result<Self> {
        let (checksum, path) = line
            .split_once(SEPARATOR)
            .ok_or_else(|| SyncError::malformed(line, "missing two-space separator"))?;

        if checksum.is_empty() || checksum.contains(' ') {
            return Err(SyncError::malformed(line, "missing checksum"));
        }
        if path.is_empty() {
            return Err(SyncError::malformed(line, "missing path"));
        }

        Ok(ManifestEntry {
            checksum: checksum.to_string(),
            path: path.to_string(),
        })
    }

    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').collect()
    }
}

/// A manifest entry translated into the remote addressing scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub checksum: String,
    /// Path with the bucket substituted and `#`/space percent-encoded.
    pub encoded_path: String,
    /// Unescaped segments after the bucket segment, used in the confirmation log.
    pub original_tail: String,
}

/// Immutable mapping from logical bucket key to canonical bucket name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketTable {
    buckets: HashMap<String, String>,
}

impl BucketTable {
    pub fn new(buckets: HashMap<String, String>) -> Self {
        Self { buckets }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.buckets.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BucketTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Resolves manifest entries against a shared [`BucketTable`].
#[derive(Debug, Clone)]
pub struct PathResolver {
    buckets: Arc<BucketTable>,
}

impl PathResolver {
    pub fn new(buckets: Arc<BucketTable>) -> Self {
        Self { buckets }
    }

    pub fn resolve_line(&self, line: &str) -> Result<ResolvedResource> {
        let entry = ManifestEntry::parse(line)?;
        self.resolve(&entry)
    }

    pub fn resolve(&self, entry: &ManifestEntry) -> Result<ResolvedResource> {
        let mut segments = entry.segments();
        if segments.len() < MIN_SEGMENTS {
            return Err(SyncError::MalformedEntry {
                line: format!("{}{}{}", entry.checksum, SEPARATOR, entry.path),
                reason: format!(
                    "path has {} segments, at least {} required",
                    segments.len(),
                    MIN_SEGMENTS
                ),
            });
        }

        let key = segments[BUCKET_KEY_INDEX];
        let bucket = self
            .buckets
            .get(key)
            .ok_or_else(|| SyncError::UnknownBucket {
                key: key.to_string(),
                path: entry.path.clone(),
            })?;

        let original_tail = segments[BUCKET_KEY_INDEX + 1..].join("/");
        segments[BUCKET_KEY_INDEX] = bucket;
        let encoded_path = encode_path(&segments.join("/"));

        debug!(key, bucket, encoded_path = %encoded_path, "Resolved manifest path");

        Ok(ResolvedResource {
            checksum: entry.checksum.clone(),
            encoded_path,
            original_tail,
        })
    }
}

/// Escapes only `#` and space; every other character is passed through.
pub fn encode_path(path: &str) -> String {
    path.replace('#', "%23").replace(' ', "%20")
}
