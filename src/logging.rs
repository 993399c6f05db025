//! Diagnostic logging setup.
//!
//! Diagnostics (retries, failures, progress) go through `tracing` to stderr.
//! The confirmation and failure records are not diagnostics; they are written
//! by [`crate::sink`].

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Honours `RUST_LOG`, defaults to `info`:
///
/// ```bash
/// RUST_LOG=debug xattr-sync "$TOKEN" manifest.txt
/// RUST_LOG=xattr_sync::retry=warn,xattr_sync=info xattr-sync "$TOKEN" manifest.txt
/// ```
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
