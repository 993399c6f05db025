//! # xattr-sync CLI Interface (Module)
//!
//! Command-line glue: argument parsing, config loading, sink construction and
//! the async [`run`] entrypoint used by `main()` and by integration tests.
//! All pipeline logic lives in [`crate::synchronise`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use crate::contract::RecordSink;
use crate::load_config::{default_config, load_config};
use crate::sink::RotatingFileSink;
use crate::synchronise::Pipeline;

/// CLI for xattr-sync: store manifest checksums as Onedata extended attributes.
#[derive(Parser, Debug)]
#[clap(
    name = "xattr-sync",
    version,
    about = "Write md5 checksums from a manifest into Onedata xattrs and log the verified values"
)]
pub struct Cli {
    /// Onedata access token, sent as X-Auth-Token
    pub token: String,

    /// Manifest file with lines of the form "<md5>  <path>"
    pub manifest: PathBuf,

    /// Optional YAML config file (endpoints, workers, retry, logs, buckets)
    #[clap(long)]
    pub config: Option<PathBuf>,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => default_config()?,
    };

    // Fail on an unreadable manifest before any log file is created.
    std::fs::metadata(&cli.manifest)
        .with_context(|| format!("failed to open manifest {}", cli.manifest.display()))?;

    let confirmations: Arc<dyn RecordSink> =
        Arc::new(RotatingFileSink::open(&config.confirmation_log)?);
    let failures: Arc<dyn RecordSink> = Arc::new(RotatingFileSink::open(&config.failure_log)?);

    let pipeline = Pipeline::from_config(&config, &cli.token, confirmations, failures)?;

    println!("Synchronise starting...");
    match pipeline.synchronise(&cli.manifest).await {
        Ok(report) => {
            println!("Synchronise complete.\nReport:");
            println!("{:#?}", report);
            Ok(())
        }
        Err(e) => {
            eprintln!("[ERROR] Synchronisation failed: {}", e);
            Err(anyhow::Error::new(e))
        }
    }
}
