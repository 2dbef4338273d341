//! # Tarball Blob Storage
//!
//! Key-addressed storage for package tarballs. Deletion is idempotent: a
//! missing key is success. Transient backend failures during deletion are
//! retried here with bounded exponential backoff; only exhaustion is
//! reported, as [`BlobDeleteFailed`].
//!
//! Blob deletion is never part of the metadata transaction. A failure leaves
//! an orphaned tarball behind, which is harmless and can be swept later.

mod local;
mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors reported by a blob store backend.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("transient blob store failure: {0}")]
    Transient(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid blob key: {0}")]
    InvalidKey(String),
}

impl BlobError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BlobError::Transient(_) => true,
            BlobError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            BlobError::InvalidKey(_) => false,
        }
    }
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Key-based tarball storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend identifier used in logs
    fn name(&self) -> &'static str;

    /// Store `data` under `key`, replacing any existing blob.
    async fn put(&self, key: &str, data: Vec<u8>) -> BlobResult<()>;

    async fn exists(&self, key: &str) -> BlobResult<bool>;

    /// Delete `key`. Deleting a key that does not exist succeeds.
    async fn delete(&self, key: &str) -> BlobResult<()>;
}

/// Bounded retry schedule for blob deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt number `attempt + 1` (attempts count from 1).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Blob deletion gave up after exhausting its attempts.
#[derive(Debug, thiserror::Error)]
#[error("failed to delete blob {key} after {attempts} attempt(s): {last_error}")]
pub struct BlobDeleteFailed {
    pub key: String,
    pub attempts: u32,
    #[source]
    pub last_error: BlobError,
}

/// Delete `key`, retrying transient failures per `policy`.
pub async fn delete_with_retry(
    store: &dyn BlobStore,
    key: &str,
    policy: &RetryPolicy,
) -> Result<(), BlobDeleteFailed> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match store.delete(key).await {
            Ok(()) => {
                debug!(backend = store.name(), key = %key, attempt, "Deleted blob");
                return Ok(());
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff_after(attempt);
                warn!(
                    backend = store.name(),
                    key = %key,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Blob delete failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(BlobDeleteFailed {
                    key: key.to_string(),
                    attempts: attempt,
                    last_error: e,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(300),
        };
        assert_eq!(policy.backoff_after(1), Duration::from_millis(50));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(100));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(4), Duration::from_millis(300));
        assert_eq!(policy.backoff_after(40), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_missing_key_is_success() {
        let store = MemoryBlobStore::new();
        delete_with_retry(&store, "never-stored", &fast_policy(3))
            .await
            .unwrap();
        assert_eq!(store.delete_calls(), vec!["never-stored".to_string()]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = MemoryBlobStore::new();
        store.put("k1", b"tarball".to_vec()).await.unwrap();
        store.fail_next_deletes(2);

        delete_with_retry(&store, "k1", &fast_policy(3)).await.unwrap();
        assert_eq!(store.delete_calls().len(), 3);
        assert!(!store.exists("k1").await.unwrap());
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_failure() {
        let store = MemoryBlobStore::new();
        store.put("k1", b"tarball".to_vec()).await.unwrap();
        store.fail_next_deletes(5);

        let err = delete_with_retry(&store, "k1", &fast_policy(3))
            .await
            .unwrap_err();
        assert_eq!(err.key, "k1");
        assert_eq!(err.attempts, 3);
        assert!(err.last_error.is_retryable());
        assert!(store.exists("k1").await.unwrap());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let store = MemoryBlobStore::new();
        let err = delete_with_retry(&store, "", &fast_policy(3))
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(matches!(err.last_error, BlobError::InvalidKey(_)));
    }
}
