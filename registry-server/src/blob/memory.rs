use super::{BlobError, BlobResult, BlobStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// In-process blob store.
///
/// Records every `delete` call so callers can assert on exactly which keys
/// were requested, and can be told to fail the next N deletes with a
/// transient error.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    deletes: Mutex<Vec<String>>,
    failures_left: AtomicU32,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys passed to `delete`, in call order.
    pub fn delete_calls(&self) -> Vec<String> {
        self.deletes
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Make the next `count` deletes fail with [`BlobError::Transient`].
    pub fn fail_next_deletes(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> BlobError {
        BlobError::Transient("memory blob store lock poisoned".to_string())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> BlobResult<()> {
        if key.is_empty() {
            return Err(BlobError::InvalidKey("empty key".to_string()));
        }
        self.blobs
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(key.to_string(), data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        Ok(self
            .blobs
            .lock()
            .map_err(|_| Self::poisoned())?
            .contains_key(key))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.deletes
            .lock()
            .map_err(|_| Self::poisoned())?
            .push(key.to_string());

        if key.is_empty() {
            return Err(BlobError::InvalidKey("empty key".to_string()));
        }

        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            return Err(BlobError::Transient(format!("injected failure for {key}")));
        }

        self.blobs
            .lock()
            .map_err(|_| Self::poisoned())?
            .remove(key);
        Ok(())
    }
}
