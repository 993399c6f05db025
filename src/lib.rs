#![doc = "xattr-sync: migrate externally computed checksums into Onedata extended attributes."]

//! Reads a manifest of `<md5>  <path>` lines, resolves each path into the
//! oneprovider namespace, writes the checksum as the `s3.content.md5` xattr,
//! reads it back, and appends the verified value to a rotating record log.
//!
//! # Layout
//! - [`resolve`]: manifest parsing and bucket substitution
//! - [`contract`]: the `XattrApi` and `RecordSink` traits
//! - [`oneprovider`]: reqwest implementation of `XattrApi`
//! - [`retry`], [`engine`]: retry policy and the three-phase exchange
//! - [`sink`]: record logs
//! - [`synchronise`]: producer, worker pool and shutdown drain

pub mod cli;
pub mod config;
pub mod contract;
pub mod engine;
pub mod error;
pub mod load_config;
pub mod logging;
pub mod oneprovider;
pub mod resolve;
pub mod retry;
pub mod sink;
pub mod synchronise;

pub use cli::{run, Cli};
pub use error::{PhaseError, SyncError};
