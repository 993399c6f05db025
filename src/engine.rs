//! Three-phase lookup / write / verify exchange for a single manifest entry.
//!
//! The phases run strictly in order against one [`XattrApi`]. Each phase is
//! wrapped in the configured [`RetryPolicy`]; a phase that exhausts the policy
//! ends the entry with [`SyncError::PermanentFailure`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contract::XattrApi;
use crate::error::{Phase, Result, SyncError};
use crate::resolve::ResolvedResource;
use crate::retry::RetryPolicy;

/// What to do when the checksum read back differs from the one written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumCheck {
    /// Fail the entry with [`SyncError::ChecksumMismatch`].
    #[default]
    Enforce,
    /// Log a warning and confirm the value that was read back.
    Warn,
}

impl FromStr for ChecksumCheck {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enforce" | "strict" => Ok(ChecksumCheck::Enforce),
            "warn" => Ok(ChecksumCheck::Warn),
            other => Err(SyncError::Config(format!("invalid checksum_check: {other}"))),
        }
    }
}

/// One verified line of the confirmation log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfirmationRecord {
    /// The value read back from the remote, not the value sent.
    pub verified_checksum: String,
    pub original_tail: String,
}

impl fmt::Display for ConfirmationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {}", self.verified_checksum, self.original_tail)
    }
}

/// One line of the failure log: the manifest line and why it was not confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub line: String,
    pub reason: String,
}

impl FailureRecord {
    pub fn new(line: &str, error: &SyncError) -> Self {
        Self {
            line: line.to_string(),
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.line, self.reason)
    }
}

/// Runs lookup, write and verify for `resource` and returns the confirmation.
pub async fn sync_entry<A>(
    api: &A,
    resource: &ResolvedResource,
    policy: &RetryPolicy,
    check: ChecksumCheck,
) -> Result<ConfirmationRecord>
where
    A: XattrApi + ?Sized,
{
    let context = format!("{} {}", api.endpoint(), resource.encoded_path);

    let file_id = policy
        .run(Phase::Lookup, &context, || {
            api.lookup_file_id(&resource.encoded_path)
        })
        .await?;
    debug!(file_id = %file_id, path = %resource.encoded_path, "Looked up file id");

    policy
        .run(Phase::Write, &context, || {
            api.write_checksum(&file_id, &resource.checksum)
        })
        .await?;

    let read_back = policy
        .run(Phase::Verify, &context, || api.read_checksum(&file_id))
        .await?;

    if read_back != resource.checksum {
        match check {
            ChecksumCheck::Enforce => {
                return Err(SyncError::ChecksumMismatch {
                    path: resource.encoded_path.clone(),
                    written: resource.checksum.clone(),
                    read_back,
                });
            }
            ChecksumCheck::Warn => {
                warn!(
                    path = %resource.encoded_path,
                    written = %resource.checksum,
                    read_back = %read_back,
                    "Read-back checksum differs from written value"
                );
            }
        }
    }

    debug!(file_id = %file_id, checksum = %read_back, "Checksum verified");

    Ok(ConfirmationRecord {
        verified_checksum: read_back,
        original_tail: resource.original_tail.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{FileId, MockXattrApi};
    use crate::error::PhaseError;
    use mockall::Sequence;

    const MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

    fn resource() -> ResolvedResource {
        ResolvedResource {
            checksum: MD5.to_string(),
            encoded_path: "a/b/c/bucket-mnk/dir/file.txt".to_string(),
            original_tail: "dir/file.txt".to_string(),
        }
    }

    fn failing_then<T: Send + 'static>(
        failures: u32,
        error: PhaseError,
        value: T,
    ) -> impl FnMut() -> std::result::Result<T, PhaseError> + Send
    where
        T: Clone,
    {
        let mut calls = 0;
        move || {
            calls += 1;
            if calls <= failures {
                Err(error.clone())
            } else {
                Ok(value.clone())
            }
        }
    }

    #[tokio::test]
    async fn retries_each_phase_until_success() {
        let mut api = MockXattrApi::new();
        api.expect_endpoint().return_const("http://mock".to_string());

        let mut lookup = failing_then(2, PhaseError::EmptyBody, FileId("F1".into()));
        api.expect_lookup_file_id()
            .withf(|path| path == "a/b/c/bucket-mnk/dir/file.txt")
            .times(3)
            .returning(move |_| lookup());

        let mut write = failing_then(
            3,
            PhaseError::UnexpectedStatus {
                expected: 204,
                actual: 500,
            },
            (),
        );
        api.expect_write_checksum()
            .withf(|id, sum| id.as_str() == "F1" && sum == MD5)
            .times(4)
            .returning(move |_, _| write());

        let mut read = failing_then(
            1,
            PhaseError::UnexpectedContentType("text/html".into()),
            MD5.to_string(),
        );
        api.expect_read_checksum()
            .times(2)
            .returning(move |_| read());

        let record = sync_entry(
            &api,
            &resource(),
            &RetryPolicy::immediate(None),
            ChecksumCheck::Enforce,
        )
        .await
        .expect("entry should be confirmed");

        assert_eq!(record.to_string(), format!("{MD5}  dir/file.txt"));
    }

    #[tokio::test]
    async fn phases_run_in_order() {
        let mut seq = Sequence::new();
        let mut api = MockXattrApi::new();
        api.expect_endpoint().return_const("http://mock".to_string());
        api.expect_lookup_file_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(FileId("F1".into())));
        api.expect_write_checksum()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        api.expect_read_checksum()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(MD5.to_string()));

        sync_entry(
            &api,
            &resource(),
            &RetryPolicy::immediate(Some(1)),
            ChecksumCheck::Enforce,
        )
        .await
        .expect("entry should be confirmed");
    }

    #[tokio::test]
    async fn exhausted_lookup_skips_later_phases() {
        let mut api = MockXattrApi::new();
        api.expect_endpoint().return_const("http://mock".to_string());
        api.expect_lookup_file_id()
            .times(2)
            .returning(|_| Err(PhaseError::Transport("timeout".into())));
        api.expect_write_checksum().never();
        api.expect_read_checksum().never();

        let err = sync_entry(
            &api,
            &resource(),
            &RetryPolicy::immediate(Some(2)),
            ChecksumCheck::Enforce,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            SyncError::PermanentFailure {
                phase: Phase::Lookup,
                attempts: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn mismatch_is_rejected_when_enforced() {
        let mut api = MockXattrApi::new();
        api.expect_endpoint().return_const("http://mock".to_string());
        api.expect_lookup_file_id()
            .returning(|_| Ok(FileId("F1".into())));
        api.expect_write_checksum().returning(|_, _| Ok(()));
        api.expect_read_checksum()
            .returning(|_| Ok("ffffffffffffffffffffffffffffffff".to_string()));

        let err = sync_entry(
            &api,
            &resource(),
            &RetryPolicy::immediate(Some(1)),
            ChecksumCheck::Enforce,
        )
        .await
        .unwrap_err();

        match err {
            SyncError::ChecksumMismatch {
                written, read_back, ..
            } => {
                assert_eq!(written, MD5);
                assert_eq!(read_back, "ffffffffffffffffffffffffffffffff");
            }
            other => panic!("expected ChecksumMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn warn_mode_confirms_read_back_value() {
        let mut api = MockXattrApi::new();
        api.expect_endpoint().return_const("http://mock".to_string());
        api.expect_lookup_file_id()
            .returning(|_| Ok(FileId("F1".into())));
        api.expect_write_checksum().returning(|_, _| Ok(()));
        api.expect_read_checksum()
            .returning(|_| Ok("0123".to_string()));

        let record = sync_entry(
            &api,
            &resource(),
            &RetryPolicy::immediate(Some(1)),
            ChecksumCheck::Warn,
        )
        .await
        .expect("warn mode confirms");

        assert_eq!(record.verified_checksum, "0123");
    }

    #[test]
    fn checksum_check_parses() {
        assert_eq!("enforce".parse::<ChecksumCheck>().unwrap(), ChecksumCheck::Enforce);
        assert_eq!("WARN".parse::<ChecksumCheck>().unwrap(), ChecksumCheck::Warn);
        assert!("maybe".parse::<ChecksumCheck>().is_err());
    }
}
